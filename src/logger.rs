use std::sync::Mutex;

use log::{info, warn};

/// Logging collaborator handed explicitly to the pipeline stages so unit
/// tests run silent and deterministic.
pub trait PipelineLogger {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
}

/// Production logger: forwards to the `log` facade (backed by `env_logger`).
#[derive(Debug, Default)]
pub struct EnvLogger;

impl PipelineLogger for EnvLogger {
    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn warning(&self, message: &str) {
        warn!("{message}");
    }
}

/// Captures log lines for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    messages: Mutex<Vec<(Level, String)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("logger mutex poisoned")
            .iter()
            .filter(|(level, _)| *level == Level::Warning)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("logger mutex poisoned")
            .iter()
            .filter(|(level, _)| *level == Level::Info)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl PipelineLogger for RecordingLogger {
    fn info(&self, message: &str) {
        self.messages
            .lock()
            .expect("logger mutex poisoned")
            .push((Level::Info, message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.messages
            .lock()
            .expect("logger mutex poisoned")
            .push((Level::Warning, message.to_string()));
    }
}
