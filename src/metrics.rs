use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    pub sequences_started: AtomicU64,
    pub sequences_succeeded: AtomicU64,
    pub reset_failures: AtomicU64,
    pub chat_failures: AtomicU64,
    pub busy_retries: AtomicU64,
    pub network_retries: AtomicU64,
    pub prompt_tokens: AtomicU64,
    pub completion_tokens: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {

        Self::default()

    }

    pub fn record_started(&self) {

        self.sequences_started.fetch_add(1, Ordering::Relaxed);

    }

    pub fn record_success(&self, prompt_tokens: u64, completion_tokens: u64) {

        self.sequences_succeeded.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion_tokens, Ordering::Relaxed);

    }

    pub fn record_reset_failure(&self) {

        self.reset_failures.fetch_add(1, Ordering::Relaxed);

    }

    pub fn record_chat_failure(&self) {

        self.chat_failures.fetch_add(1, Ordering::Relaxed);

    }

    pub fn record_busy_retry(&self) {

        self.busy_retries.fetch_add(1, Ordering::Relaxed);

    }

    pub fn record_network_retry(&self) {

        self.network_retries.fetch_add(1, Ordering::Relaxed);

    }

    pub fn snapshot(&self) -> MetricsSnapshot {

        MetricsSnapshot {
            sequences_started: self.sequences_started.load(Ordering::Relaxed),
            sequences_succeeded: self.sequences_succeeded.load(Ordering::Relaxed),
            reset_failures: self.reset_failures.load(Ordering::Relaxed),
            chat_failures: self.chat_failures.load(Ordering::Relaxed),
            busy_retries: self.busy_retries.load(Ordering::Relaxed),
            network_retries: self.network_retries.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub sequences_started: u64,
    pub sequences_succeeded: u64,
    pub reset_failures: u64,
    pub chat_failures: u64,
    pub busy_retries: u64,
    pub network_retries: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl MetricsSnapshot {
    pub fn failed(&self) -> u64 {
        self.reset_failures + self.chat_failures
    }

    pub fn success_rate(&self) -> f64 {

        let finished = self.sequences_succeeded + self.failed();
        if finished == 0 {
            return 0.0;
        }
        (self.sequences_succeeded as f64 / finished as f64) * 100.0

    }
}
