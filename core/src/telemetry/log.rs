use log::info;

/// Stage-scoped wrapper over the `log` facade.
pub struct LogManager;

impl LogManager {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, stage: &str, message: &str) {
        info!("[{}] {}", stage, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
