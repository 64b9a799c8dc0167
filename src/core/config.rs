use std::time::Duration;

/// Replication runtime configuration
///
/// Covers the heartbeat timers on both halves of the protocol and the
/// callback dispatcher's eviction bound.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period between heartbeats pushed by the master
    pub heartbeat_period: Duration,

    /// Period between liveness checks on a replica
    pub check_period: Duration,

    /// Consecutive missed checks a replica tolerates before declaring
    /// the connection lost
    pub max_missed_checks: u32,

    /// Undelivered events a replica's outbound queue may hold before the
    /// replica is marked permanently unreachable
    pub max_queued_events: usize,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            heartbeat_period: Duration::from_secs(2),
            check_period: Duration::from_secs(3),
            max_missed_checks: 2,
            max_queued_events: 5,
        }
    }

    /// Set the master-side heartbeat period
    pub fn heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Set the replica-side liveness check period
    pub fn check_period(mut self, period: Duration) -> Self {
        self.check_period = period;
        self
    }

    /// Set the missed-check threshold
    pub fn max_missed_checks(mut self, checks: u32) -> Self {
        self.max_missed_checks = checks;
        self
    }

    /// Set the dispatcher queue bound
    pub fn max_queued_events(mut self, events: usize) -> Self {
        self.max_queued_events = events;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_period.is_zero() {
            return Err("heartbeat_period must be non-zero".to_string());
        }
        if self.check_period.is_zero() {
            return Err("check_period must be non-zero".to_string());
        }
        if self.max_queued_events == 0 {
            return Err("max_queued_events must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
