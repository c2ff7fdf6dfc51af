use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;

use observer_api::{FailureReason, MessageMetadata, Observation, RecordKind};
use observation_store::ObservationStore;

use crate::Assertions;
use crate::error::{AssertionError, PredicateError};

/// Timeout used when an expectation is awaited without [`Expectation::within`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Stand-in deadline for timeouts too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A stored record whose payload decoded into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedMessage<T> {
    pub value: T,
    pub metadata: MessageMetadata,
}

/// A matched failure together with the reason it was routed to an error topic.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedFailure<T> {
    pub value: T,
    pub metadata: MessageMetadata,
    pub reason: FailureReason,
}

pub(crate) type Predicate<'a, T> =
    Box<dyn FnMut(&ObservedMessage<T>) -> Result<bool, PredicateError> + Send + 'a>;

type ReasonPredicate<'a> = Box<dyn FnMut(&FailureReason) -> bool + Send + 'a>;

/// Records of the wrong shape are not candidates.
fn decode<T: DeserializeOwned>(observation: &Observation) -> Option<ObservedMessage<T>> {
    let value = serde_json::from_slice(observation.payload()?).ok()?;
    Some(ObservedMessage {
        value,
        metadata: observation.metadata(),
    })
}

fn is_committed(store: &ObservationStore, metadata: &MessageMetadata) -> bool {
    match (metadata.partition, metadata.offset) {
        (Some(partition), Some(offset)) => store.is_committed(&metadata.topic, partition, offset),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Deadline: poll pacing shared by every assertion
// ═══════════════════════════════════════════════════════════════

pub(crate) struct Deadline {
    started: Instant,
    deadline: Instant,
    interval: Duration,
}

impl Deadline {
    pub(crate) fn start(timeout: Duration, interval: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started
                .checked_add(timeout)
                .unwrap_or_else(|| started + FAR_FUTURE),
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Sleep until the next pass. `false` once the deadline has passed.
    pub(crate) async fn tick(&self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        tokio::time::sleep(self.interval.min(self.deadline - now)).await;
        true
    }
}

// ═══════════════════════════════════════════════════════════════
//  Expectation
// ═══════════════════════════════════════════════════════════════

/// Polls one bucket of the store until a record decodes into `T` and
/// satisfies the predicate.
///
/// Created by [`Assertions::expect`] and the `should_be_*` helpers; awaiting
/// it runs the poll loop. Dropping the future stops polling.
///
/// ```ignore
/// let order = assertions
///     .expect::<OrderCreated, _>(RecordKind::Consumed, |m| m.value.id == 42)
///     .within(Duration::from_secs(3))
///     .committed()
///     .await?;
/// ```
pub struct Expectation<'a, T> {
    assertions: &'a Assertions,
    kind: RecordKind,
    predicate: Predicate<'a, T>,
    subject: String,
    timeout: Duration,
    poll_interval: Duration,
    require_commit: bool,
    min_matches: usize,
}

impl<'a, T: DeserializeOwned + 'a> Expectation<'a, T> {
    pub(crate) fn new(assertions: &'a Assertions, kind: RecordKind, predicate: Predicate<'a, T>) -> Self {
        Self {
            assertions,
            kind,
            predicate,
            subject: format!("message of type {}", std::any::type_name::<T>()),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: assertions.poll_interval(),
            require_commit: false,
            min_matches: 1,
        }
    }

    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Label used in failure messages instead of the type name.
    pub fn named(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Also require the consumer to have committed past the matched record.
    pub fn committed(mut self) -> Self {
        self.require_commit = true;
        self
    }

    /// Succeed only once `times` distinct records match.
    pub fn at_least(mut self, times: usize) -> Self {
        self.min_matches = times.max(1);
        self
    }

    async fn run(mut self) -> Result<ObservedMessage<T>, AssertionError> {
        let clock = Deadline::start(self.timeout, self.poll_interval);
        loop {
            if let Some(found) = self.evaluate()? {
                tracing::debug!(subject = %self.subject, kind = %self.kind, elapsed = ?clock.elapsed(), "expectation met");
                return Ok(found);
            }
            if !clock.tick().await {
                return Err(self.timed_out(clock.elapsed()));
            }
        }
    }

    fn test(&mut self, candidate: &ObservedMessage<T>) -> Result<bool, AssertionError> {
        (self.predicate)(candidate).map_err(|source| AssertionError::Predicate {
            subject: self.subject.clone(),
            source,
        })
    }

    /// One pass over the current snapshot.
    fn evaluate(&mut self) -> Result<Option<ObservedMessage<T>>, AssertionError> {
        if self.kind == RecordKind::Consumed {
            self.fail_fast_on_failure()?;
        }

        let assertions = self.assertions;
        let store = assertions.store();

        let mut matched = 0;
        let mut first = None;
        for observation in store.snapshot(self.kind) {
            let Some(candidate) = decode::<T>(&observation) else {
                continue;
            };
            if !self.test(&candidate)? {
                continue;
            }
            if self.require_commit && !is_committed(store, &candidate.metadata) {
                continue;
            }
            matched += 1;
            if first.is_none() {
                first = Some(candidate);
            }
            if matched >= self.min_matches {
                return Ok(first);
            }
        }
        Ok(None)
    }

    /// A consumed expectation whose message shows up as failed will not recover,
    /// even when the same message was also consumed before being dead-lettered.
    fn fail_fast_on_failure(&mut self) -> Result<(), AssertionError> {
        let assertions = self.assertions;
        let store = assertions.store();
        for observation in store.snapshot(RecordKind::Failed) {
            let Some(candidate) = decode::<T>(&observation) else {
                continue;
            };
            if self.test(&candidate)? {
                let reason = observation
                    .failure_reason()
                    .cloned()
                    .unwrap_or_else(|| FailureReason::new(FailureReason::ROUTED_TO_ERROR_TOPIC, ""));
                return Err(AssertionError::FailedInsteadOfConsumed {
                    subject: self.subject.clone(),
                    reason,
                    dump: store.dump(RecordKind::Failed),
                });
            }
        }
        Ok(())
    }

    fn timed_out(&self, elapsed: Duration) -> AssertionError {
        let store = self.assertions.store();
        let mut dump = store.dump(self.kind);
        if self.require_commit {
            dump.push('\n');
            dump.push_str(&store.dump(RecordKind::Committed));
        }
        if self.kind == RecordKind::Committed {
            dump.push_str("\ncommits carry no payload to match on; use should_be_committed");
        }
        AssertionError::Timeout {
            subject: self.subject.clone(),
            kind: self.kind,
            elapsed,
            examined: store.len(self.kind),
            dump,
        }
    }
}

impl<'a, T> IntoFuture for Expectation<'a, T>
where
    T: DeserializeOwned + Send + 'a,
{
    type Output = Result<ObservedMessage<T>, AssertionError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl<T> fmt::Debug for Expectation<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("kind", &self.kind)
            .field("subject", &self.subject)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("require_commit", &self.require_commit)
            .field("min_matches", &self.min_matches)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════
//  FailureExpectation
// ═══════════════════════════════════════════════════════════════

/// Polls the failed bucket. With [`FailureExpectation::because`], a message
/// that failed for another reason is reported at once instead of timing out.
pub struct FailureExpectation<'a, T> {
    inner: Expectation<'a, T>,
    reason: Option<ReasonPredicate<'a>>,
}

impl<'a, T: DeserializeOwned + 'a> FailureExpectation<'a, T> {
    pub(crate) fn new(assertions: &'a Assertions, predicate: Predicate<'a, T>) -> Self {
        Self {
            inner: Expectation::new(assertions, RecordKind::Failed, predicate),
            reason: None,
        }
    }

    pub fn within(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.within(timeout);
        self
    }

    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.inner = self.inner.poll_every(interval);
        self
    }

    pub fn named(mut self, subject: impl Into<String>) -> Self {
        self.inner = self.inner.named(subject);
        self
    }

    /// Require the failure reason to satisfy `predicate`.
    pub fn because<F>(mut self, predicate: F) -> Self
    where
        F: FnMut(&FailureReason) -> bool + Send + 'a,
    {
        self.reason = Some(Box::new(predicate));
        self
    }

    async fn run(mut self) -> Result<ObservedFailure<T>, AssertionError> {
        let clock = Deadline::start(self.inner.timeout, self.inner.poll_interval);
        loop {
            if let Some(found) = self.evaluate()? {
                return Ok(found);
            }
            if !clock.tick().await {
                return Err(self.inner.timed_out(clock.elapsed()));
            }
        }
    }

    fn evaluate(&mut self) -> Result<Option<ObservedFailure<T>>, AssertionError> {
        let assertions = self.inner.assertions;
        let store = assertions.store();

        let mut mismatched = Vec::new();
        for observation in store.snapshot(RecordKind::Failed) {
            let Observation::Failed(failed) = &observation else {
                continue;
            };
            let Some(candidate) = decode::<T>(&observation) else {
                continue;
            };
            if !self.inner.test(&candidate)? {
                continue;
            }
            let expected = match self.reason.as_mut() {
                Some(predicate) => predicate(&failed.reason),
                None => true,
            };
            if expected {
                return Ok(Some(ObservedFailure {
                    value: candidate.value,
                    metadata: candidate.metadata,
                    reason: failed.reason.clone(),
                }));
            }
            mismatched.push(failed.reason.to_string());
        }

        if mismatched.is_empty() {
            return Ok(None);
        }
        Err(AssertionError::UnexpectedFailureReason {
            subject: self.inner.subject.clone(),
            reasons: mismatched.join("; "),
            dump: store.dump(RecordKind::Failed),
        })
    }
}

impl<'a, T> IntoFuture for FailureExpectation<'a, T>
where
    T: DeserializeOwned + Send + 'a,
{
    type Output = Result<ObservedFailure<T>, AssertionError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl<T> fmt::Debug for FailureExpectation<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureExpectation")
            .field("inner", &self.inner)
            .field("has_reason_predicate", &self.reason.is_some())
            .finish()
    }
}
