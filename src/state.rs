//! Application state shared across handlers and background tasks

use std::sync::Arc;

use tracing::Span;

use crate::config::Settings;
use crate::models::Models;
use crate::services::{mailer::Mailer, tasks::TaskTracker};

/// Shared application context.
///
/// Built once at startup and cloned cheaply into every handler. Nothing is
/// replaced after construction; only the task tracker's count changes.
#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    logger: Span,
    models: Models,
    mailer: Arc<Mailer>,
    tasks: TaskTracker,
}

impl AppState {
    #[must_use]
    pub fn new(settings: Settings, logger: Span, models: Models, mailer: Mailer) -> Self {
        Self {
            settings: Arc::new(settings),
            logger,
            models,
            mailer: Arc::new(mailer),
            tasks: TaskTracker::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Span carrying the environment and version; enter it or instrument
    /// futures with it to tag their log lines.
    pub const fn logger(&self) -> &Span {
        &self.logger
    }

    pub const fn models(&self) -> &Models {
        &self.models
    }

    #[allow(dead_code)]
    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }

    pub const fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }
}
