// ============================================================================
// Client Poll Orchestrator
// ============================================================================
//
// A state machine per active conversation: Idle -> Polling -> Backoff ->
// Polling. A repeating timer calls the poll endpoint with the current
// cursor, advances the cursor past what came back, and fans new messages
// out to every subscribed listener.
//
// Contract:
// - at most one in-flight poll request per conversation (a tick that fires
//   while a request is outstanding is skipped, never overlapped);
// - closing or switching conversations stops the timer synchronously and
//   bumps the epoch counter; a response from a poll issued under a stale
//   epoch is discarded on arrival rather than physically aborted;
// - isolated failures keep the machine in Polling; repeated consecutive
//   failures escalate to Backoff with exponentially increasing delay, and
//   one successful round recovers to Polling.
//
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use uuid::Uuid;

use crate::message::QueueEntry;
use crate::resolver::DEFAULT_POLL_LIMIT;

#[derive(Debug, Clone, Error)]
pub enum PollError {
    /// Network failure, deadline expiry or a 5xx from the server. Retryable;
    /// a deadline miss is treated identically to any other transient error.
    #[error("transient poll failure: {0}")]
    Transient(String),

    /// The server rejected the poll outright (unknown user, bad request).
    /// Retrying will not help; the conversation is parked in Idle.
    #[error("terminal poll failure: {0}")]
    Terminal(String),
}

/// Transport used to reach the poll endpoint. The orchestrator only sees
/// this seam, which keeps its state machine independent of HTTP plumbing.
#[async_trait]
pub trait PollTransport: Send + Sync {
    async fn fetch_new(
        &self,
        user_id: Uuid,
        since: Option<i64>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, PollError>;
}

// ============================================================================
// HTTP transport
// ============================================================================

#[derive(Deserialize)]
struct PollResponse {
    messages: Vec<QueueEntry>,
}

pub struct HttpPollClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPollClient {
    /// `request_timeout` is the per-poll deadline; expiry surfaces as a
    /// transient error, not a fatal one.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PollTransport for HttpPollClient {
    async fn fetch_new(
        &self,
        user_id: Uuid,
        since: Option<i64>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, PollError> {
        let mut url = format!("{}/messages/poll/{}?limit={}", self.base_url, user_id, limit);
        if let Some(since) = since {
            url.push_str(&format!("&since={}", since));
        }

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PollError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: PollResponse = response
                .json()
                .await
                .map_err(|e| PollError::Transient(e.to_string()))?;
            Ok(body.messages)
        } else if status == StatusCode::SERVICE_UNAVAILABLE || status.is_server_error() {
            Err(PollError::Transient(format!("poll failed with status {}", status)))
        } else {
            Err(PollError::Terminal(format!("poll rejected with status {}", status)))
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    /// Sustained failures; visible to the UI as a soft degraded-connectivity
    /// indicator, never an interrupting error.
    Backoff,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Baseline tick between polls.
    pub interval: Duration,
    /// Consecutive failures tolerated before entering Backoff.
    pub failure_threshold: u32,
    /// Ceiling for the exponential backoff delay.
    pub backoff_max: Duration,
    /// Window size requested per poll.
    pub limit: usize,
    /// Buffered batches per listener before lagging.
    pub channel_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            failure_threshold: 3,
            backoff_max: Duration::from_secs(30),
            limit: DEFAULT_POLL_LIMIT,
            channel_capacity: 64,
        }
    }
}

/// Subscription handle for one opened conversation.
pub struct ConversationHandle {
    pub partner_id: Uuid,
    events: broadcast::Sender<Vec<QueueEntry>>,
    state: watch::Receiver<PollState>,
}

impl ConversationHandle {
    /// Any number of UI surfaces may subscribe to the same stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<QueueEntry>> {
        self.events.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }
}

struct ActiveConversation {
    partner_id: Uuid,
    cancel: watch::Sender<bool>,
    state: watch::Receiver<PollState>,
}

/// Drives polling for one user's active conversation. Opening a new
/// conversation cancels the previous one; cursors are per conversation and
/// never shared.
pub struct ConversationPoller {
    user_id: Uuid,
    transport: Arc<dyn PollTransport>,
    config: PollerConfig,
    epoch: Arc<AtomicU64>,
    active: Mutex<Option<ActiveConversation>>,
}

impl ConversationPoller {
    pub fn new(user_id: Uuid, transport: Arc<dyn PollTransport>, config: PollerConfig) -> Self {
        Self {
            user_id,
            transport,
            config,
            epoch: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        }
    }

    /// Opens a conversation with the cursor initialized to "now": only
    /// messages arriving after this point are delivered.
    pub fn open(&self, partner_id: Uuid) -> ConversationHandle {
        self.open_at(partner_id, chrono::Utc::now().timestamp_millis())
    }

    /// Opens a conversation with an explicit starting cursor.
    pub fn open_at(&self, partner_id: Uuid, cursor: i64) -> ConversationHandle {
        self.close();

        let my_epoch = self.epoch.load(Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(self.config.channel_capacity);
        let (state_tx, state_rx) = watch::channel(PollState::Polling);

        tracing::debug!(partner_id = %partner_id, cursor, "Conversation opened");

        let poll_loop = PollLoop {
            transport: self.transport.clone(),
            user_id: self.user_id,
            partner_id,
            config: self.config.clone(),
            epoch: self.epoch.clone(),
            my_epoch,
            cursor,
            events: events_tx.clone(),
            state: state_tx,
            cancel: cancel_rx,
        };
        tokio::spawn(poll_loop.run());

        let handle = ConversationHandle {
            partner_id,
            events: events_tx,
            state: state_rx.clone(),
        };
        *self.active.lock().unwrap() = Some(ActiveConversation {
            partner_id,
            cancel: cancel_tx,
            state: state_rx,
        });
        handle
    }

    /// Cancels the active conversation: the timer stops synchronously and
    /// the epoch bump invalidates any response still in flight.
    pub fn close(&self) {
        let mut active = self.active.lock().unwrap();
        if let Some(conversation) = active.take() {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            let _ = conversation.cancel.send(true);
            tracing::debug!(partner_id = %conversation.partner_id, "Conversation closed");
        }
    }

    pub fn current_partner(&self) -> Option<Uuid> {
        self.active.lock().unwrap().as_ref().map(|c| c.partner_id)
    }

    pub fn state(&self) -> PollState {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|c| *c.state.borrow())
            .unwrap_or(PollState::Idle)
    }
}

impl Drop for ConversationPoller {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Poll loop
// ============================================================================

struct PollLoop {
    transport: Arc<dyn PollTransport>,
    user_id: Uuid,
    partner_id: Uuid,
    config: PollerConfig,
    epoch: Arc<AtomicU64>,
    my_epoch: u64,
    cursor: i64,
    events: broadcast::Sender<Vec<QueueEntry>>,
    state: watch::Sender<PollState>,
    cancel: watch::Receiver<bool>,
}

impl PollLoop {
    async fn run(mut self) {
        let mut ticker = interval(self.config.interval);
        // Ticks that fire while a request is outstanding are skipped; the
        // request itself is awaited inline, so at most one is in flight.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut consecutive_failures: u32 = 0;

        loop {
            let cancelled = match self.backoff_delay(consecutive_failures) {
                None => tokio::select! {
                    _ = ticker.tick() => false,
                    _ = self.cancel.changed() => true,
                },
                Some(delay) => tokio::select! {
                    _ = sleep(delay) => false,
                    _ = self.cancel.changed() => true,
                },
            };
            if cancelled || *self.cancel.borrow() {
                break;
            }
            if self.epoch.load(Ordering::SeqCst) != self.my_epoch {
                break;
            }

            let result = self
                .transport
                .fetch_new(self.user_id, Some(self.cursor), self.config.limit)
                .await;

            // The conversation may have been closed while the request was in
            // flight; its response must not reach the new conversation.
            if self.epoch.load(Ordering::SeqCst) != self.my_epoch {
                tracing::debug!(
                    partner_id = %self.partner_id,
                    "Discarding poll response issued under a stale epoch"
                );
                break;
            }

            match result {
                Ok(batch) => {
                    if consecutive_failures >= self.config.failure_threshold {
                        ticker.reset();
                    }
                    consecutive_failures = 0;
                    self.state.send_replace(PollState::Polling);
                    if let Some(max_ts) = batch.iter().map(|e| e.timestamp).max() {
                        if max_ts > self.cursor {
                            self.cursor = max_ts;
                        }
                    }
                    if !batch.is_empty() {
                        let _ = self.events.send(batch);
                    }
                }
                Err(PollError::Transient(reason)) => {
                    consecutive_failures += 1;
                    tracing::debug!(
                        partner_id = %self.partner_id,
                        failures = consecutive_failures,
                        reason = %reason,
                        "Poll round failed"
                    );
                    if consecutive_failures >= self.config.failure_threshold {
                        self.state.send_replace(PollState::Backoff);
                    }
                }
                Err(PollError::Terminal(reason)) => {
                    tracing::error!(
                        partner_id = %self.partner_id,
                        reason = %reason,
                        "Poll terminated"
                    );
                    self.state.send_replace(PollState::Idle);
                    break;
                }
            }
        }
    }

    fn backoff_delay(&self, consecutive_failures: u32) -> Option<Duration> {
        if consecutive_failures < self.config.failure_threshold {
            return None;
        }
        let exponent = (consecutive_failures - self.config.failure_threshold).min(16);
        let delay = self
            .config
            .interval
            .saturating_mul(2u32.saturating_pow(exponent + 1));
        Some(delay.min(self.config.backoff_max))
    }
}
