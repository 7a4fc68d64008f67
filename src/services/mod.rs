//! Application services

pub mod mailer;
pub mod tasks;
