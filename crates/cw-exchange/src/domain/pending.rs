//! Correlation table - the async-to-sync bridge.
//!
//! Maps `action -> domain key -> call id` to the calls waiting for a broker
//! response. Every mutation takes the one table lock, so a timeout firing
//! and a dispatcher match for the same call can never both win.

use crate::domain::call_id::CallId;
use crate::domain::error::{CallResult, ExchangeError};
use cw_bus::Action;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

/// Scalar fields of the outbound envelope kept for predicate matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallFields {
    pub user_id: Option<i64>,
    pub token: Option<String>,
}

impl CallFields {
    pub fn new(user_id: Option<i64>, token: Option<&str>) -> Self {
        Self {
            user_id,
            token: token.map(str::to_string),
        }
    }
}

/// Field filter for mass resolution. `None` means the field is not named.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallPredicate {
    pub user_id: Option<i64>,
    pub token: Option<String>,
}

impl CallPredicate {
    /// Empty predicate: matches every call of the action.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            token: None,
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            user_id: None,
            token: Some(token.into()),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.user_id.is_none() && self.token.is_none()
    }

    /// Every named field must be present on the call with an equal value.
    pub fn matches(&self, fields: &CallFields) -> bool {
        let user_ok = self
            .user_id
            .map_or(true, |user_id| fields.user_id == Some(user_id));
        let token_ok = self
            .token
            .as_deref()
            .map_or(true, |token| fields.token.as_deref() == Some(token));
        user_ok && token_ok
    }
}

/// Statistics for the correlation table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total calls registered
    pub registered: AtomicU64,
    /// Calls resolved with a value
    pub resolved: AtomicU64,
    /// Calls rejected by a broker result code
    pub rejected: AtomicU64,
    /// Calls rejected by their timeout alarm
    pub timed_out: AtomicU64,
    /// Calls rejected because the publish failed
    pub transport_failed: AtomicU64,
    /// Calls settled after their caller went away
    pub abandoned: AtomicU64,
}

impl PendingStats {
    fn record(&self, outcome: &CallResult) {
        let counter = match outcome {
            Ok(_) => &self.resolved,
            Err(ExchangeError::TimedOut) => &self.timed_out,
            Err(ExchangeError::Transport(_)) => &self.transport_failed,
            Err(_) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Caller's side of a pending call.
#[derive(Debug)]
pub struct PendingReply(oneshot::Receiver<CallResult>);

impl Future for PendingReply {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.0).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ExchangeError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// One outstanding call awaiting a broker response.
///
/// Settling consumes the call, so a call removed from the table can be
/// resolved or rejected exactly once.
#[derive(Debug)]
pub struct PendingCall {
    action: Action,
    domain_key: String,
    call_id: CallId,
    fields: CallFields,
    created_at: Instant,
    sender: Option<oneshot::Sender<CallResult>>,
    timer: Option<AbortHandle>,
    stats: Option<Arc<PendingStats>>,
}

impl PendingCall {
    /// Create an unsettled call and the reply its caller awaits.
    pub fn new(
        action: Action,
        domain_key: impl Into<String>,
        fields: CallFields,
    ) -> (Self, PendingReply) {
        let (tx, rx) = oneshot::channel();
        let call = Self {
            action,
            domain_key: domain_key.into(),
            call_id: CallId::new(),
            fields,
            created_at: Instant::now(),
            sender: Some(tx),
            timer: None,
            stats: None,
        };
        (call, PendingReply(rx))
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn domain_key(&self) -> &str {
        &self.domain_key
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn fields(&self) -> &CallFields {
        &self.fields
    }

    /// Settle with a value.
    pub fn resolve(self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error.
    pub fn reject(self, error: ExchangeError) -> bool {
        self.settle(Err(error))
    }

    /// Cancel the alarm and deliver the outcome. Returns false when the
    /// caller is no longer waiting.
    pub fn settle(mut self, outcome: CallResult) -> bool {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let Some(sender) = self.sender.take() else {
            return false;
        };
        if let Some(stats) = &self.stats {
            stats.record(&outcome);
        }

        let ok = outcome.is_ok();
        match sender.send(outcome) {
            Ok(()) => {
                debug!(
                    action = %self.action,
                    domain_key = %self.domain_key,
                    call_id = %self.call_id,
                    ok = ok,
                    response_time_ms = self.created_at.elapsed().as_millis() as u64,
                    "Settled pending call"
                );
                true
            }
            Err(_) => {
                if let Some(stats) = &self.stats {
                    stats.abandoned.fetch_add(1, Ordering::Relaxed);
                }
                debug!(
                    action = %self.action,
                    call_id = %self.call_id,
                    "Pending call receiver dropped"
                );
                false
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        // An unsettled call dropped with the table must not leave its alarm running.
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

type Buckets = HashMap<String, HashMap<CallId, PendingCall>>;
type Calls = HashMap<Action, Buckets>;

/// Registry of in-flight calls.
///
/// Flow:
/// 1. Gateway creates a [`PendingCall`] and `push`es it
/// 2. Gateway arms the timeout and attaches it with `attach_timer`
/// 3. Gateway publishes the envelope
/// 4. Dispatcher, the timeout, or a failed publish completes the call;
///    whichever removes it first is the only one to settle it
#[derive(Debug, Default)]
pub struct CorrelationTable {
    calls: Mutex<Calls>,
    stats: Arc<PendingStats>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call under `(action, domain key, call id)`.
    ///
    /// Several calls may share a domain key; they are told apart by call id.
    pub fn push(&self, mut call: PendingCall) -> CallId {
        let call_id = call.call_id;
        call.stats = Some(Arc::clone(&self.stats));

        debug!(
            action = %call.action,
            domain_key = %call.domain_key,
            call_id = %call_id,
            "Registered pending call"
        );

        let mut calls = self.calls.lock();
        calls
            .entry(call.action.clone())
            .or_default()
            .entry(call.domain_key.clone())
            .or_default()
            .insert(call_id, call);
        self.stats.registered.fetch_add(1, Ordering::Relaxed);

        call_id
    }

    /// Hand the timeout alarm to its call. When the call is already gone
    /// (a fast response beat the alarm) the alarm is cancelled instead.
    pub fn attach_timer(
        &self,
        action: &Action,
        domain_key: &str,
        call_id: CallId,
        timer: AbortHandle,
    ) -> bool {
        let mut calls = self.calls.lock();
        let call = calls
            .get_mut(action)
            .and_then(|buckets| buckets.get_mut(domain_key))
            .and_then(|bucket| bucket.get_mut(&call_id));

        match call {
            Some(call) => {
                call.timer = Some(timer);
                true
            }
            None => {
                timer.abort();
                false
            }
        }
    }

    /// Remove and return every call under the exact domain key.
    pub fn pop_by_key(&self, action: &Action, domain_key: &str) -> Vec<PendingCall> {
        let popped = take_by_key(&mut self.calls.lock(), action, domain_key);
        debug!(action = %action, domain_key = domain_key, count = popped.len(), "pop_by_key");
        popped
    }

    /// Remove and return the call with `call_id`, whatever its domain key.
    pub fn pop_by_call_id(&self, action: &Action, call_id: CallId) -> Option<PendingCall> {
        take_by_call_id(&mut self.calls.lock(), action, call_id)
    }

    /// Remove and return every call of `action` whose fields match.
    pub fn pop_by_predicate(&self, action: &Action, predicate: &CallPredicate) -> Vec<PendingCall> {
        let popped = take_by_predicate(&mut self.calls.lock(), action, predicate);
        debug!(
            action = %action,
            predicate = ?predicate,
            count = popped.len(),
            "pop_by_predicate"
        );
        popped
    }

    /// Remove and settle every call under the exact domain key.
    pub fn complete_by_key(&self, action: &Action, domain_key: &str, outcome: &CallResult) -> usize {
        let mut calls = self.calls.lock();
        settle_all(take_by_key(&mut calls, action, domain_key), outcome)
    }

    /// Remove and settle every call of `action` matched by `predicate`.
    pub fn complete_by_predicate(
        &self,
        action: &Action,
        predicate: &CallPredicate,
        outcome: &CallResult,
    ) -> usize {
        let mut calls = self.calls.lock();
        settle_all(take_by_predicate(&mut calls, action, predicate), outcome)
    }

    /// Remove and settle one call by id. False if it was already gone.
    pub fn complete_by_call_id(&self, action: &Action, call_id: CallId, outcome: CallResult) -> bool {
        let mut calls = self.calls.lock();
        match take_by_call_id(&mut calls, action, call_id) {
            Some(call) => {
                call.settle(outcome);
                true
            }
            None => false,
        }
    }

    /// Number of calls currently pending across all actions
    pub fn pending_count(&self) -> usize {
        self.calls
            .lock()
            .values()
            .flat_map(HashMap::values)
            .map(HashMap::len)
            .sum()
    }

    /// Number of calls currently pending for one action
    pub fn pending_for(&self, action: &Action) -> usize {
        self.calls
            .lock()
            .get(action)
            .map(|buckets| buckets.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    /// Check if a call is still pending
    pub fn contains(&self, action: &Action, call_id: CallId) -> bool {
        self.calls
            .lock()
            .get(action)
            .is_some_and(|buckets| buckets.values().any(|bucket| bucket.contains_key(&call_id)))
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

fn settle_all(popped: Vec<PendingCall>, outcome: &CallResult) -> usize {
    let count = popped.len();
    for call in popped {
        call.settle(outcome.clone());
    }
    count
}

fn take_by_key(calls: &mut Calls, action: &Action, domain_key: &str) -> Vec<PendingCall> {
    let Some(buckets) = calls.get_mut(action) else {
        return Vec::new();
    };
    let popped = buckets
        .remove(domain_key)
        .map(|bucket| bucket.into_values().collect())
        .unwrap_or_default();
    if buckets.is_empty() {
        calls.remove(action);
    }
    popped
}

fn take_by_call_id(calls: &mut Calls, action: &Action, call_id: CallId) -> Option<PendingCall> {
    let buckets = calls.get_mut(action)?;
    let (domain_key, call) = buckets.iter_mut().find_map(|(domain_key, bucket)| {
        bucket
            .remove(&call_id)
            .map(|call| (domain_key.clone(), call))
    })?;

    if buckets.get(&domain_key).is_some_and(HashMap::is_empty) {
        buckets.remove(&domain_key);
    }
    if buckets.is_empty() {
        calls.remove(action);
    }
    Some(call)
}

fn take_by_predicate(
    calls: &mut Calls,
    action: &Action,
    predicate: &CallPredicate,
) -> Vec<PendingCall> {
    let Some(buckets) = calls.get_mut(action) else {
        return Vec::new();
    };

    let mut popped = Vec::new();
    for bucket in buckets.values_mut() {
        let matched: Vec<CallId> = bucket
            .iter()
            .filter(|(_, call)| predicate.matches(&call.fields))
            .map(|(call_id, _)| *call_id)
            .collect();
        popped.extend(matched.iter().filter_map(|call_id| bucket.remove(call_id)));
    }

    buckets.retain(|_, bucket| !bucket.is_empty());
    if buckets.is_empty() {
        calls.remove(action);
    }
    popped
}
