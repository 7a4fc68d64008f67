//! 설정 모듈.

mod db;
pub mod duration;
mod env;
mod settings;

pub use db::{Database, PoolError, PoolStats};
pub use env::ProcessEnv;
pub use settings::{
    resolve, ConfigError, DatabaseSettings, Environment, LimiterSettings, Resolution, Settings,
    SmtpSettings,
};
