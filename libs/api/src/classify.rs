use serde::{Deserialize, Serialize};

/// Intent of a topic, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Normal,
    Retry,
    Error,
}

fn default_error_suffixes() -> Vec<String> {
    vec![".error".to_string(), ".DLT".to_string()]
}

fn default_retry_suffixes() -> Vec<String> {
    vec![".retry".to_string()]
}

/// Suffix configuration for error and retry topics.
///
/// Matching is case-insensitive. Empty lists classify everything as
/// [`TopicKind::Normal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSuffixes {
    #[serde(default = "default_error_suffixes")]
    pub error: Vec<String>,
    #[serde(default = "default_retry_suffixes")]
    pub retry: Vec<String>,
}

impl Default for TopicSuffixes {
    fn default() -> Self {
        Self {
            error: default_error_suffixes(),
            retry: default_retry_suffixes(),
        }
    }
}

impl TopicSuffixes {
    pub fn new(error: Vec<String>, retry: Vec<String>) -> Self {
        Self { error, retry }
    }

    /// No suffixes at all: every topic is normal.
    pub fn none() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn classify(&self, topic: &str) -> TopicKind {
        classify(topic, &self.error, &self.retry)
    }

    pub fn is_error_topic(&self, topic: &str) -> bool {
        self.classify(topic) == TopicKind::Error
    }

    pub fn is_retry_topic(&self, topic: &str) -> bool {
        self.classify(topic) == TopicKind::Retry
    }
}

/// Classify `topic` by suffix. Error wins over retry.
///
/// Total: any input, including an empty topic, yields a kind. Empty
/// suffixes never match.
pub fn classify<S: AsRef<str>>(
    topic: &str,
    error_suffixes: &[S],
    retry_suffixes: &[S],
) -> TopicKind {
    if matches_any(topic, error_suffixes) {
        TopicKind::Error
    } else if matches_any(topic, retry_suffixes) {
        TopicKind::Retry
    } else {
        TopicKind::Normal
    }
}

fn matches_any<S: AsRef<str>>(topic: &str, suffixes: &[S]) -> bool {
    suffixes
        .iter()
        .any(|suffix| ends_with_ignore_case(topic, suffix.as_ref()))
}

fn ends_with_ignore_case(topic: &str, suffix: &str) -> bool {
    let (topic, suffix) = (topic.as_bytes(), suffix.as_bytes());
    !suffix.is_empty()
        && topic.len() >= suffix.len()
        && topic[topic.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
