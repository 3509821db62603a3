//! Delivery guarantees, retry policy and resource model

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delivery guarantee of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityOfService {
    /// Drop messages when the buffer is full
    BestEffort,
    /// Never drop; a full buffer fails the send so the sender can retry
    #[default]
    AtLeastOnce,
    /// As at-least-once, and each message id is accepted at most once
    ExactlyOnce,
}

impl QualityOfService {
    /// Name as written in configuration
    pub fn as_str(self) -> &'static str {
        match self {
            QualityOfService::BestEffort => "best-effort",
            QualityOfService::AtLeastOnce => "at-least-once",
            QualityOfService::ExactlyOnce => "exactly-once",
        }
    }

    /// Whether a full buffer may silently drop messages
    pub fn may_drop(self) -> bool {
        self == QualityOfService::BestEffort
    }
}

impl fmt::Display for QualityOfService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityOfService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "best-effort" => Ok(QualityOfService::BestEffort),
            "at-least-once" => Ok(QualityOfService::AtLeastOnce),
            "exactly-once" => Ok(QualityOfService::ExactlyOnce),
            other => Err(format!(
                "unknown quality of service '{other}' (expected best-effort, at-least-once or exactly-once)"
            )),
        }
    }
}

/// Serialize a [`Duration`] as whole milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Exponential backoff between delivery attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds in config)
    #[serde(with = "duration_ms", rename = "initial_delay_ms")]
    pub initial_delay: Duration,

    /// Upper bound on any single delay (milliseconds in config)
    #[serde(with = "duration_ms", rename = "max_delay_ms")]
    pub max_delay: Duration,

    /// Growth factor applied per retry
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Default backoff with `max_attempts` attempts
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay to wait before retry number `attempt` (1-based).
    ///
    /// Attempt 0 is the initial delivery and waits for nothing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let nanos = self.initial_delay.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Time limits for node operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Maximum time to process one message
    #[serde(with = "duration_ms", rename = "process_ms")]
    pub process: Duration,
    /// Maximum time to start
    #[serde(with = "duration_ms", rename = "startup_ms")]
    pub startup: Duration,
    /// Maximum time to stop
    #[serde(with = "duration_ms", rename = "shutdown_ms")]
    pub shutdown: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            process: Duration::from_secs(30),
            startup: Duration::from_secs(10),
            shutdown: Duration::from_secs(10),
        }
    }
}

/// Resource limits requested by a node. `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// CPU cores
    pub cpu: Option<f64>,
    /// Memory in bytes
    pub memory: Option<u64>,
    /// Scratch storage in bytes
    pub storage: Option<u64>,
    /// Network bandwidth in bytes per second
    pub network: Option<u64>,
    /// Operation time limits
    pub timeouts: Timeouts,
    /// Messages processed at once
    pub concurrency: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cpu: None,
            memory: None,
            storage: None,
            network: None,
            timeouts: Timeouts::default(),
            concurrency: 1,
        }
    }
}

/// Operating state of a started node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Acquiring resources
    Starting,
    /// Processing normally
    Running,
    /// Processing with reduced capability
    Degraded,
    /// Processing at a reduced rate
    Throttled,
    /// Releasing resources
    Stopping,
    /// Not processing
    Stopped,
}

impl ResourceState {
    /// Whether the transition `self -> next` is allowed.
    ///
    /// ```text
    /// starting -> running | stopping
    /// running | degraded | throttled -> running | degraded | throttled | stopping
    /// stopping -> stopped
    /// stopped -> starting
    /// ```
    pub fn can_transition_to(self, next: ResourceState) -> bool {
        use ResourceState::*;
        match self {
            Starting => matches!(next, Running | Stopping),
            Running | Degraded | Throttled => {
                next != self && matches!(next, Running | Degraded | Throttled | Stopping)
            }
            Stopping => next == Stopped,
            Stopped => next == Starting,
        }
    }

    /// Whether the node accepts data-plane calls in this state
    pub fn is_processing(self) -> bool {
        matches!(
            self,
            ResourceState::Running | ResourceState::Degraded | ResourceState::Throttled
        )
    }

    /// Name in snake case
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceState::Starting => "starting",
            ResourceState::Running => "running",
            ResourceState::Degraded => "degraded",
            ResourceState::Throttled => "throttled",
            ResourceState::Stopping => "stopping",
            ResourceState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
