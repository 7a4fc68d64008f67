//! Common constants used across the application

use std::time::Duration;

/// Deadline for proving the store is reachable at startup.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection cap used when `db-max-open-conns` is unbounded.
/// sqlx preallocates its idle queue to the cap, so it has to be finite.
pub const UNBOUNDED_MAX_CONNECTIONS: u32 = 10_000;

/// Build identifier reported by `--version` and the metrics registry.
pub const VERSION: &str = match option_env!("BUILD_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

// Mailer
pub const SMTP_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAIL_SEND_ATTEMPTS: u32 = 3;
pub const MAIL_RETRY_DELAY: Duration = Duration::from_millis(500);
