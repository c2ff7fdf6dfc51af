use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use observer_api::RecordKind;
use observation_store::ObservationStore;

use crate::error::{AssertionError, PredicateError};
use crate::expectation::{Deadline, Expectation, FailureExpectation, ObservedMessage};

/// Default pause between two passes over the store.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Entry point for eventual-consistency assertions over an [`ObservationStore`].
#[derive(Clone)]
pub struct Assertions {
    store: Arc<ObservationStore>,
    poll_interval: Duration,
}

impl Assertions {
    pub fn new(store: Arc<ObservationStore>) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait for a record of `kind` matching `predicate`.
    ///
    /// Only kinds with a payload can match. Commits carry none, so
    /// [`RecordKind::Committed`] never matches here; use
    /// [`Self::should_be_committed`] instead.
    pub fn expect<'a, T, F>(&'a self, kind: RecordKind, mut predicate: F) -> Expectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        Expectation::new(
            self,
            kind,
            Box::new(move |message: &ObservedMessage<T>| Ok::<bool, PredicateError>(predicate(message))),
        )
    }

    /// Like [`Self::expect`], for predicates that can fail. A predicate error
    /// ends the wait immediately.
    pub fn try_expect<'a, T, F>(&'a self, kind: RecordKind, predicate: F) -> Expectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> Result<bool, PredicateError> + Send + 'a,
    {
        Expectation::new(self, kind, Box::new(predicate))
    }

    pub fn should_be_consumed<'a, T, F>(&'a self, timeout: Duration, predicate: F) -> Expectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        self.expect(RecordKind::Consumed, predicate).within(timeout)
    }

    pub fn should_be_published<'a, T, F>(&'a self, timeout: Duration, predicate: F) -> Expectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        self.expect(RecordKind::Published, predicate).within(timeout)
    }

    /// Succeeds once at least `times` retried records match.
    pub fn should_be_retried<'a, T, F>(
        &'a self,
        timeout: Duration,
        times: usize,
        predicate: F,
    ) -> Expectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        self.expect(RecordKind::Retried, predicate)
            .within(timeout)
            .at_least(times)
    }

    pub fn should_be_failed<'a, T, F>(&'a self, timeout: Duration, mut predicate: F) -> FailureExpectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        FailureExpectation::new(
            self,
            Box::new(move |message: &ObservedMessage<T>| Ok::<bool, PredicateError>(predicate(message))),
        )
        .within(timeout)
    }

    /// Wait until the consumer committed past `offset` on `(topic, partition)`.
    pub async fn should_be_committed(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        timeout: Duration,
    ) -> Result<(), AssertionError> {
        let clock = Deadline::start(timeout, self.poll_interval);
        loop {
            if self.store.is_committed(topic, partition, offset) {
                return Ok(());
            }
            if !clock.tick().await {
                return Err(AssertionError::Timeout {
                    subject: format!("offset {offset} of {topic}[{partition}]"),
                    kind: RecordKind::Committed,
                    elapsed: clock.elapsed(),
                    examined: self.store.len(RecordKind::Committed),
                    dump: self.store.dump(RecordKind::Committed),
                });
            }
        }
    }
}

impl std::fmt::Debug for Assertions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assertions")
            .field("poll_interval", &self.poll_interval)
            .field("store", &self.store)
            .finish()
    }
}
