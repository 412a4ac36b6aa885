//! Configuration for the client engine.

use crate::record::RecordCache;
use crate::scheduler::{ImmediateScheduler, Scheduler};
use recsync_codec::DEFAULT_MAX_PACKET_SIZE;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Expected interval between server heartbeats. The connection is
    /// considered dead after twice this long without inbound traffic.
    pub heartbeat_interval: Duration,
    /// Reconnect configuration.
    pub reconnect: ReconnectConfig,
    /// Largest frame accepted or produced, in bytes.
    pub max_packet_size: usize,
    /// Default deadline for record waits.
    pub default_read_timeout: Duration,
    /// How often zero-reference records are swept.
    pub prune_interval: Duration,
    /// Inbound messages dispatched per scheduler pass.
    pub batch_size: usize,
    /// Optional time budget for one scheduler pass.
    pub drain_deadline: Option<Duration>,
    /// Period of the timer spawned by `Client::spawn_timers`.
    pub tick_interval: Duration,
    /// Identity written into locally generated versions.
    pub user: String,
    /// Scheduler for inbound draining and outbound flushing.
    pub scheduler: Arc<dyn Scheduler>,
    /// Optional read-through/write-behind record cache.
    pub cache: Option<Arc<dyn RecordCache>>,
}

impl ClientConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            default_read_timeout: Duration::from_secs(60),
            prune_interval: Duration::from_secs(1),
            batch_size: 1024,
            drain_deadline: None,
            tick_interval: Duration::from_millis(100),
            user: String::new(),
            scheduler: Arc::new(ImmediateScheduler),
            cache: None,
        }
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the reconnect configuration.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the maximum packet size.
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Sets the default read timeout.
    pub fn with_default_read_timeout(mut self, timeout: Duration) -> Self {
        self.default_read_timeout = timeout;
        self
    }

    /// Sets the prune interval.
    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }

    /// Sets the inbound batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Bounds each drain pass by a deadline.
    pub fn with_drain_deadline(mut self, deadline: Duration) -> Self {
        self.drain_deadline = Some(deadline);
        self
    }

    /// Sets the timer period.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the user written into local versions.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Sets the scheduler.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Sets the record cache.
    pub fn with_cache(mut self, cache: Arc<dyn RecordCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect", &self.reconnect)
            .field("max_packet_size", &self.max_packet_size)
            .field("default_read_timeout", &self.default_read_timeout)
            .field("prune_interval", &self.prune_interval)
            .field("batch_size", &self.batch_size)
            .field("drain_deadline", &self.drain_deadline)
            .field("tick_interval", &self.tick_interval)
            .field("user", &self.user)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Configuration for reconnect behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay added per failed attempt.
    pub increment: Duration,
    /// Upper bound on the delay.
    pub max_interval: Duration,
    /// Retries scheduled before giving up.
    pub max_attempts: u32,
}

impl ReconnectConfig {
    /// Creates a reconnect configuration with default delays.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            increment: Duration::from_secs(4),
            max_interval: Duration::from_secs(180),
            max_attempts,
        }
    }

    /// Creates a configuration that never reconnects.
    pub fn no_retry() -> Self {
        Self {
            increment: Duration::ZERO,
            max_interval: Duration::ZERO,
            max_attempts: 0,
        }
    }

    /// Sets the per-attempt increment.
    pub fn with_increment(mut self, increment: Duration) -> Self {
        self.increment = increment;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Calculates the delay before a given attempt (1-indexed).
    ///
    /// The delay grows linearly by `increment` and is capped at
    /// `max_interval`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.increment
            .saturating_mul(attempt)
            .min(self.max_interval)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(5)
    }
}
