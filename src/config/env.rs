//! 환경 변수 조회 모듈.

use std::collections::HashMap;
use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the environment by loading the .env file.
fn init_env() {
    INIT.call_once(|| {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("Skipping .env file: {e}");
        }
    });
}

/// Source of environment values used as flag defaults.
pub trait EnvLookup {
    fn get(&self, key: &str) -> Option<String>;

    /// Returns the value for `key`, or `default` when unset.
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }
}

/// The process environment, with `.env` loaded on first access.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        init_env();
        env::var(key).ok()
    }
}

impl<S: ::std::hash::BuildHasher> EnvLookup for HashMap<&str, &str, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).map(|v| (*v).to_owned())
    }
}
