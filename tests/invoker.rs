//! Retry behavior of the resilient invoker against a scripted client:
//! attempt ceiling, backoff schedule, elapsed-time budget, and recovery.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::time::Instant;

use quantflow::{
    ChatMessage, CompletionClient, CompletionRequest, InvocationError, Invoker, RetryPolicy,
};

/// Fails every call until `succeed_on` (1-indexed), recording when each
/// attempt arrived.
struct ScriptedClient {
    calls: AtomicU32,
    attempt_times: Mutex<Vec<Instant>>,
    succeed_on: Option<u32>,
}

impl ScriptedClient {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            attempt_times: Mutex::new(Vec::new()),
            succeed_on: None,
        })
    }

    fn succeeding_on(attempt: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            attempt_times: Mutex::new(Vec::new()),
            succeed_on: Some(attempt),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.attempt_times.lock().unwrap().push(Instant::now());
        match self.succeed_on {
            Some(n) if call >= n => Ok("the decision".to_string()),
            _ => Err(anyhow!("503 upstream unavailable")),
        }
    }
}

fn request() -> CompletionRequest {
    CompletionRequest::new(
        "gemini-1.5-flash",
        vec![ChatMessage::user("Make a trading decision.")],
    )
}

#[tokio::test(start_paused = true)]
async fn exhausts_after_exactly_the_attempt_ceiling() {
    let client = ScriptedClient::failing();
    let invoker = Invoker::new(client.clone(), RetryPolicy::default());

    let err = invoker.invoke(&request()).await.unwrap_err();

    match err {
        InvocationError::Exhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"), "got {last_error}");
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(client.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn inter_attempt_delays_are_non_decreasing() {
    let client = ScriptedClient::failing();
    let invoker = Invoker::new(client.clone(), RetryPolicy::default());

    let _ = invoker.invoke(&request()).await;

    let times = client.attempt_times.lock().unwrap();
    assert_eq!(times.len(), 3);
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    // base 1s doubling: 1s before attempt 2, 2s before attempt 3.
    assert_eq!(gaps, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    for pair in gaps.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[tokio::test(start_paused = true)]
async fn recovers_on_a_later_attempt() {
    let client = ScriptedClient::succeeding_on(3);
    let invoker = Invoker::new(client.clone(), RetryPolicy::default());

    let content = invoker.invoke(&request()).await.unwrap();

    assert_eq!(content, "the decision");
    assert_eq!(client.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn elapsed_budget_cuts_retries_short() {
    let client = ScriptedClient::failing();
    let policy = RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(60),
        max_elapsed: Duration::from_secs(15),
    };
    let invoker = Invoker::new(client.clone(), policy);

    let err = invoker.invoke(&request()).await.unwrap_err();

    // Attempt 1 at t=0, attempt 2 after a 10s backoff; the 20s delay before
    // attempt 3 would blow the 15s budget.
    match err {
        InvocationError::BudgetExhausted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected BudgetExhausted, got {other:?}"),
    }
    assert_eq!(client.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn first_attempt_is_immediate() {
    let client = ScriptedClient::succeeding_on(1);
    let invoker = Invoker::new(client.clone(), RetryPolicy::default());
    let started = Instant::now();

    invoker.invoke(&request()).await.unwrap();

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(client.calls(), 1);
}
