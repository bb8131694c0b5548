use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::client::{ChatOutcome, Runtime, RuntimeClient, RuntimeReply, Timeouts};
use crate::config::{MessageOrder, Settings};
use crate::error::{AdapterError, RuntimeCallError};
use crate::metrics::Metrics;
use crate::mock::MockRuntime;
use crate::models::{Completion, CompletionParams, Message, estimate_prompt_tokens, estimate_tokens};
use crate::process::RuntimeProcess;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 20,
            delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencePhase {
    Idle = 0,
    Resetting = 1,
    Chatting = 2,
}

impl SequencePhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SequencePhase::Resetting,
            2 => SequencePhase::Chatting,
            _ => SequencePhase::Idle,
        }
    }
}

// puts the phase back to idle however the sequence ends
struct PhaseGuard<'a>(&'a AtomicU8);

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a AtomicU8) -> Self {
        phase.store(SequencePhase::Resetting as u8, Ordering::Release);
        PhaseGuard(phase)
    }

    fn advance(&self, next: SequencePhase) {
        self.0.store(next as u8, Ordering::Release);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(SequencePhase::Idle as u8, Ordering::Release);
    }
}

impl MessageOrder {
    pub fn arrange(&self, messages: &[Message]) -> Vec<Message> {
        match self {
            MessageOrder::Chronological => messages.to_vec(),
            MessageOrder::Reversed => messages.iter().rev().cloned().collect(),
        }
    }
}

// one context on the runtime side, so one sequence at a time
pub struct RuntimeAdapter {
    runtime: Arc<dyn Runtime>,
    slot: Mutex<()>,
    retry: RetryPolicy,
    order: MessageOrder,
    process: Option<RuntimeProcess>,
    metrics: Metrics,
    phase: AtomicU8,
    mock: bool,
}

impl RuntimeAdapter {

    pub fn new(runtime: Arc<dyn Runtime>, retry: RetryPolicy, order: MessageOrder) -> Self {

        RuntimeAdapter {
            runtime,
            slot: Mutex::new(()),
            retry,
            order,
            process: None,
            metrics: Metrics::new(),
            phase: AtomicU8::new(SequencePhase::Idle as u8),
            mock: false,
        }

    }

    pub fn mock(retry: RetryPolicy) -> Self {

        let mut adapter = Self::new(Arc::new(MockRuntime), retry, MessageOrder::Chronological);
        adapter.mock = true;
        adapter

    }

    // launches the runtime binary first when one is configured
    pub async fn from_settings(settings: &Settings) -> io::Result<Self> {

        let retry = RetryPolicy {
            max_attempts: settings.chat_max_attempts,
            delay: settings.chat_retry_delay,
        };

        if settings.mock_runtime {
            info!("mock runtime enabled, runtime client not started");
            return Ok(Self::mock(retry));
        }

        let client = RuntimeClient::new(
            settings.runtime_base_url(),
            Timeouts {
                reset: settings.reset_timeout,
                chat: settings.chat_timeout,
                health: settings.health_timeout,
            },
        );
        info!(runtime = client.base_url(), order = ?settings.message_order, "using runtime");

        let mut adapter = Self::new(Arc::new(client), retry, settings.message_order);

        if let Some(bin) = &settings.runtime_bin {
            let process = RuntimeProcess::new(settings.runtime_port);
            process.start(bin).await?;
            adapter.process = Some(process);
        }

        Ok(adapter)

    }

    pub fn is_mock(&self) -> bool {
        self.mock
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn phase(&self) -> SequencePhase {
        SequencePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub async fn health(&self) -> bool {
        self.runtime.health().await
    }

    // None when the runtime is not launched by this service
    pub async fn process_running(&self) -> Option<bool> {

        match &self.process {
            Some(process) => Some(process.is_running().await),
            None => None,
        }

    }

    pub async fn shutdown(&self) {

        if let Some(process) = &self.process {
            process.stop().await;
        }

    }

    pub async fn reset_then_chat(
        &self,
        system_prompt: &str,
        messages: &[Message],
        params: &CompletionParams,
    ) -> Result<Completion, AdapterError> {

        let _slot = self.slot.lock().await;
        let phase = PhaseGuard::enter(&self.phase);
        self.metrics.record_started();

        let result = self.run_sequence(&phase, system_prompt, messages, params).await;

        match &result {
            Ok(completion) => self.metrics.record_success(completion.prompt_tokens, completion.completion_tokens),
            Err(AdapterError::Reset(_)) => self.metrics.record_reset_failure(),
            Err(_) => self.metrics.record_chat_failure(),
        }

        if let Err(e) = &result {
            error!(error = %e, "runtime sequence failed");
        }

        result

    }

    async fn run_sequence(
        &self,
        phase: &PhaseGuard<'_>,
        system_prompt: &str,
        messages: &[Message],
        params: &CompletionParams,
    ) -> Result<Completion, AdapterError> {

        self.runtime
            .reset(system_prompt)
            .await
            .map_err(AdapterError::Reset)?;

        phase.advance(SequencePhase::Chatting);

        let wire_messages = self.order.arrange(messages);
        debug!(count = wire_messages.len(), order = ?self.order, "sending messages to runtime");

        let reply = self.chat_with_retry(&wire_messages, params).await?;
        Ok(normalize(reply, &wire_messages))

    }

    async fn chat_with_retry(
        &self,
        messages: &[Message],
        params: &CompletionParams,
    ) -> Result<RuntimeReply, AdapterError> {

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let last_attempt = attempt >= max_attempts;

            match self.runtime.chat(messages, params).await {
                Ok(ChatOutcome::Reply(reply)) => return Ok(reply),
                Ok(ChatOutcome::Busy) => {
                    if last_attempt {
                        return Err(AdapterError::BusyExhausted { attempts: attempt });
                    }
                    self.metrics.record_busy_retry();
                    warn!(attempt, max_attempts, "runtime busy, retrying in {:?}", self.retry.delay);
                }
                Err(RuntimeCallError::Network(e)) => {
                    if last_attempt {
                        return Err(AdapterError::NetworkExhausted {
                            attempts: attempt,
                            source: RuntimeCallError::Network(e),
                        });
                    }
                    self.metrics.record_network_retry();
                    warn!(attempt, max_attempts, error = %e, "network error during chat, retrying in {:?}", self.retry.delay);
                }
                Err(RuntimeCallError::Http { status, body }) => {
                    return Err(AdapterError::ChatHttp { status, body });
                }
                Err(RuntimeCallError::Protocol(reason)) => {
                    return Err(AdapterError::ChatProtocol(reason));
                }
            }

            sleep(self.retry.delay).await;
        }

    }

    #[cfg(test)]
    fn slot_is_free(&self) -> bool {
        self.slot.try_lock().is_ok()
    }

}

// usage reported by the runtime wins; otherwise count words on both sides
fn normalize(reply: RuntimeReply, sent: &[Message]) -> Completion {

    match reply {
        RuntimeReply::Generated { text, usage: Some(usage) } => Completion {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        },
        RuntimeReply::Generated { text, usage: None } | RuntimeReply::Message { message: text } => Completion {
            prompt_tokens: estimate_prompt_tokens(sent),
            completion_tokens: estimate_tokens(&text),
            text,
        },
    }

}
