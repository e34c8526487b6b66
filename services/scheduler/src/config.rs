//! Service configuration.

use std::time::Duration;

use anyhow::Result;

/// Runtime knobs for the scheduler actor.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often live jobs are pulled from every host.
    pub job_sync_interval: Duration,

    /// How often formations are pulled from the controller.
    pub formation_sync_interval: Duration,

    /// Capacity of each work queue. Must exceed the worst-case fan-out of a
    /// single sync (known jobs + known formations).
    pub queue_capacity: usize,

    /// Per-subscriber event buffer; a subscriber that falls further behind
    /// than this loses its oldest events.
    pub event_capacity: usize,

    /// How long the loop parks when every queue is empty.
    pub idle_wait: Duration,

    /// Whether this instance starts as leader. Only a leader mutates the
    /// cluster; followers keep their observed view warm for failover.
    pub leader: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_sync_interval: Duration::from_secs(30),
            formation_sync_interval: Duration::from_secs(60),
            queue_capacity: 1000,
            event_capacity: 1000,
            idle_wait: Duration::from_secs(1),
            leader: false,
        }
    }
}

/// Service configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub log_level: String,
    pub dev_cluster: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = SchedulerConfig::default();

        let job_sync_interval = env_secs("FLOTILLA_JOB_SYNC_INTERVAL")
            .unwrap_or(defaults.job_sync_interval);

        let formation_sync_interval = env_secs("FLOTILLA_FORMATION_SYNC_INTERVAL")
            .unwrap_or(defaults.formation_sync_interval);

        let queue_capacity = env_parse("FLOTILLA_QUEUE_CAPACITY")
            .unwrap_or(defaults.queue_capacity);

        let event_capacity = env_parse("FLOTILLA_EVENT_CAPACITY")
            .unwrap_or(defaults.event_capacity);

        let idle_wait = env_parse("FLOTILLA_IDLE_WAIT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.idle_wait);

        let leader = env_bool("FLOTILLA_LEADER");

        let log_level = std::env::var("FLOTILLA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_cluster = env_bool("FLOTILLA_DEV_CLUSTER");

        Ok(Self {
            scheduler: SchedulerConfig {
                job_sync_interval,
                formation_sync_interval,
                queue_capacity,
                event_capacity,
                idle_wait,
                leader,
            },
            log_level,
            dev_cluster,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse(key).map(Duration::from_secs)
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|s| matches!(s.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.job_sync_interval, Duration::from_secs(30));
        assert_eq!(config.formation_sync_interval, Duration::from_secs(60));
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.event_capacity, 1000);
        assert_eq!(config.idle_wait, Duration::from_secs(1));
        assert!(!config.leader);
    }
}
