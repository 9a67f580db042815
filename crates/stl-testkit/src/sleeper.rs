use std::sync::Mutex;
use std::time::Duration;
use stl_reconcile::Sleeper;

/// Records every requested delay and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn delays_ms(&self) -> Vec<u128> {
        self.delays().iter().map(Duration::as_millis).collect()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(duration);
    }
}
