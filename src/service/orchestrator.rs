/// Single-flight request orchestration with cancellation and fixed-delay retry.
///
/// One slot per `RequestCategory`. Starting an operation replaces (and cancels) whatever occupied
/// its slot; settling clears the slot only if it still belongs to that operation. Cancellation drops
/// the in-flight `reqwest` future, which aborts the underlying connection.

use crate::error::{service_error_text, AppError};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCategory {
    Status,
    Predict,
}

impl RequestCategory {
    pub const ALL: [RequestCategory; 2] = [RequestCategory::Status, RequestCategory::Predict];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCategory::Status => "status",
            RequestCategory::Predict => "predict",
        }
    }
}

impl fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry on one specific status with a constant delay; the service's warm-up time is roughly fixed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retryable_status: u16,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retryable_status: SERVICE_UNAVAILABLE,
            retry_delay,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// First attempt plus retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }
}

/// Result of an operation that was not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    /// Superseded or explicitly cancelled; not an error.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

/// Receiving side of a slot's cancellation signal.
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once cancelled. A dropped sender counts as cancelled.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `fut` unless cancellation arrives first, in which case `fut` is dropped.
    pub async fn run<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

struct Slot {
    id: u64,
    cancel: watch::Sender<bool>,
}

#[derive(Default)]
pub struct Orchestrator {
    slots: Mutex<HashMap<RequestCategory, Slot>>,
    next_id: AtomicU64,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<RequestCategory, Slot>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the slot for `category`, cancelling any operation already in it.
    pub fn start(&self, category: RequestCategory) -> Operation<'_> {
        let (tx, rx) = watch::channel(false);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self.lock_slots().insert(category, Slot { id, cancel: tx });
        if let Some(previous) = previous {
            let _ = previous.cancel.send(true);
            info!(%category, superseded = previous.id, by = id, "Superseding in-flight request");
        }

        Operation {
            orchestrator: self,
            category,
            id,
            token: CancelToken { rx },
        }
    }

    /// Cancel one category, or every category when `None`. Cancelling an empty slot is a no-op.
    pub fn cancel(&self, category: Option<RequestCategory>) {
        let removed: Vec<(RequestCategory, Slot)> = {
            let mut slots = self.lock_slots();
            match category {
                Some(category) => slots.remove(&category).map(|slot| (category, slot)).into_iter().collect(),
                None => slots.drain().collect(),
            }
        };

        for (category, slot) in removed {
            let _ = slot.cancel.send(true);
            info!(%category, id = slot.id, "Cancelled request");
        }
    }

    pub fn is_in_flight(&self, category: RequestCategory) -> bool {
        self.lock_slots().contains_key(&category)
    }

    fn settle(&self, category: RequestCategory, id: u64) {
        let mut slots = self.lock_slots();
        if slots.get(&category).map(|slot| slot.id) == Some(id) {
            slots.remove(&category);
        }
    }

    /// Start an operation in `category` and send one logical request through it.
    pub async fn execute<T, F>(
        &self,
        category: RequestCategory,
        policy: &RetryPolicy,
        build: F,
    ) -> Result<Outcome<T>, AppError>
    where
        T: DeserializeOwned,
        F: FnMut() -> Result<RequestBuilder, AppError>,
    {
        let mut operation = self.start(category);
        operation.send(policy, build).await
    }
}

/// An operation holding its category slot. The slot is released when this is dropped.
pub struct Operation<'a> {
    orchestrator: &'a Orchestrator,
    category: RequestCategory,
    id: u64,
    token: CancelToken,
}

impl Operation<'_> {
    pub fn category(&self) -> RequestCategory {
        self.category
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run a non-HTTP step (e.g. preprocessing) under this operation's cancellation.
    pub async fn run<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        self.token.run(fut).await
    }

    /// Send the request produced by `build`, retrying on the policy's status.
    ///
    /// `build` is called once per attempt because multipart bodies cannot be replayed.
    pub async fn send<T, F>(&mut self, policy: &RetryPolicy, mut build: F) -> Result<Outcome<T>, AppError>
    where
        T: DeserializeOwned,
        F: FnMut() -> Result<RequestBuilder, AppError>,
    {
        let category = self.category;
        let mut attempt: u32 = 0;

        loop {
            if self.token.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let request = build()?;
            debug!(%category, attempt = attempt.saturating_add(1), of = policy.max_attempts(), "Sending request");

            let response = match self.token.run(request.send()).await {
                Some(response) => response?,
                None => {
                    info!(%category, "Request cancelled in flight");
                    return Ok(Outcome::Cancelled);
                }
            };

            let status = response.status().as_u16();

            if status == policy.retryable_status {
                let Some(body) = self.token.run(response.text()).await else {
                    return Ok(Outcome::Cancelled);
                };
                let body = error_body_or_placeholder(category, status, body);
                let message = service_error_text(&body).unwrap_or(body);

                if attempt < policy.max_retries {
                    warn!(
                        %category,
                        retry = attempt + 1,
                        max_retries = policy.max_retries,
                        delay_ms = policy.retry_delay.as_millis() as u64,
                        "Service unavailable ({message}), retrying"
                    );
                    if self.token.run(tokio::time::sleep(policy.retry_delay)).await.is_none() {
                        info!(%category, "Request cancelled during retry delay");
                        return Ok(Outcome::Cancelled);
                    }
                    attempt += 1;
                    continue;
                }

                return Err(AppError::TransientServiceUnavailable {
                    attempts: attempt.saturating_add(1),
                    message,
                });
            }

            if !(200..300).contains(&status) {
                let Some(body) = self.token.run(response.text()).await else {
                    return Ok(Outcome::Cancelled);
                };
                let body = error_body_or_placeholder(category, status, body);
                warn!(%category, status, "Service returned an error");
                return Err(AppError::Service { status, body });
            }

            let Some(bytes) = self.token.run(response.bytes()).await else {
                return Ok(Outcome::Cancelled);
            };
            let bytes = bytes?;

            // A response that lands after supersession is discarded
            if self.token.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let payload = serde_json::from_slice::<T>(&bytes)
                .map_err(|e| AppError::InvalidResponse(format!("{category} response: {e}")))?;

            debug!(%category, attempts = attempt.saturating_add(1), "Request completed");
            return Ok(Outcome::Completed(payload));
        }
    }
}

/// The status decides what happens next; an unreadable error body is logged and described instead.
fn error_body_or_placeholder<E: fmt::Display>(category: RequestCategory, status: u16, body: Result<String, E>) -> String {
    match body {
        Ok(body) => body,
        Err(e) => {
            warn!(%category, status, "Failed to read error response body: {e}");
            format!("<unreadable response body: {e}>")
        }
    }
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        self.orchestrator.settle(self.category, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_twice_cancels_the_first() {
        let orchestrator = Orchestrator::new();
        let first = orchestrator.start(RequestCategory::Predict);
        assert!(!first.is_cancelled());

        let second = orchestrator.start(RequestCategory::Predict);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        // The superseded operation must not free the newer one's slot
        drop(first);
        assert!(orchestrator.is_in_flight(RequestCategory::Predict));
        drop(second);
        assert!(!orchestrator.is_in_flight(RequestCategory::Predict));
    }

    #[test]
    fn categories_are_independent() {
        let orchestrator = Orchestrator::new();
        let status = orchestrator.start(RequestCategory::Status);
        let predict = orchestrator.start(RequestCategory::Predict);

        orchestrator.cancel(Some(RequestCategory::Predict));
        assert!(predict.is_cancelled());
        assert!(!status.is_cancelled());
        assert!(orchestrator.is_in_flight(RequestCategory::Status));
    }

    #[test]
    fn cancel_all_clears_every_slot_and_is_idempotent() {
        let orchestrator = Orchestrator::new();
        let status = orchestrator.start(RequestCategory::Status);
        let predict = orchestrator.start(RequestCategory::Predict);

        orchestrator.cancel(None);
        orchestrator.cancel(None);
        orchestrator.cancel(Some(RequestCategory::Status));

        assert!(status.is_cancelled());
        assert!(predict.is_cancelled());
        for category in RequestCategory::ALL {
            assert!(!orchestrator.is_in_flight(category));
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_running_step() {
        let orchestrator = Orchestrator::new();
        let mut operation = orchestrator.start(RequestCategory::Predict);

        let (result, _) = tokio::join!(
            operation.run(tokio::time::sleep(Duration::from_secs(30))),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                orchestrator.cancel(Some(RequestCategory::Predict));
            }
        );
        assert!(result.is_none());
    }

    #[test]
    fn attempt_count_saturates() {
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
        assert_eq!(RetryPolicy::new(u32::MAX, Duration::ZERO).max_attempts(), u32::MAX);
    }

    #[test]
    fn unreadable_error_body_is_described() {
        let ok: Result<String, std::io::Error> = Ok("{\"error\":\"loading\"}".to_string());
        assert_eq!(error_body_or_placeholder(RequestCategory::Predict, 503, ok), "{\"error\":\"loading\"}");

        let broken: Result<String, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed mid-body"));
        let text = error_body_or_placeholder(RequestCategory::Predict, 503, broken);
        assert_eq!(text, "<unreadable response body: connection closed mid-body>");
        assert_eq!(service_error_text(&text), None);
    }

    #[test]
    fn outcome_helpers() {
        let done: Outcome<u32> = Outcome::Completed(2);
        assert_eq!(done.clone().map(|v| v * 2), Outcome::Completed(4));
        assert_eq!(done.completed(), Some(2));
        assert!(Outcome::<u32>::Cancelled.is_cancelled());
    }
}
