//! Test modules and shared helpers


#[cfg(test)]
pub mod helpers {
    use std::time::Duration;

    use crate::config::{
        Database, DatabaseSettings, Environment, LimiterSettings, Settings, SmtpSettings,
    };
    use crate::startup::{self, Application};

    pub const MEMORY_DSN: &str = "sqlite::memory:";

    pub fn db_settings(dsn: &str, max_open: u32, max_idle: u32) -> DatabaseSettings {
        DatabaseSettings {
            dsn: dsn.to_string(),
            max_open_conns: max_open,
            max_idle_conns: max_idle,
            max_idle_time: Duration::from_secs(15 * 60),
        }
    }

    pub fn test_settings(db: DatabaseSettings) -> Settings {
        Settings {
            port: 0,
            env: Environment::Development,
            db,
            limiter: LimiterSettings {
                rps: 2.0,
                burst: 4,
                enabled: true,
            },
            smtp: SmtpSettings {
                host: "localhost".to_string(),
                port: 2525,
                username: "user".to_string(),
                password: "pass".to_string(),
                sender: "Greenlight <no-reply@greenlight.local>".to_string(),
            },
            trusted_origins: vec!["http://localhost:9000".to_string()],
            sentry_dsn: String::new(),
        }
    }

    pub async fn open_memory_db(max_open: u32, max_idle: u32) -> Database {
        Database::open(&db_settings(MEMORY_DSN, max_open, max_idle))
            .await
            .unwrap()
    }

    pub async fn test_application() -> Application {
        let settings = test_settings(db_settings(MEMORY_DSN, 4, 4));
        let db = Database::open(&settings.db).await.unwrap();
        match startup::build(settings, db) {
            Ok(application) => application,
            Err(e) => panic!("failed to build application: {e}"),
        }
    }
}
