//! Construction-time profiler settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_TRIGGER_INTERVAL_MS: u64 = 10;
pub const DEFAULT_CYCLE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_HISTORY_CAPACITY: usize = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProfilerConfig {
    /// How often every thread's stack is sampled.
    #[serde(default = "default_trigger_interval_ms")]
    pub trigger_interval_ms: u64,

    /// How often the accumulating tree is frozen into history.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Maximum number of frozen cycles kept.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_trigger_interval_ms() -> u64 {
    DEFAULT_TRIGGER_INTERVAL_MS
}

fn default_cycle_interval_ms() -> u64 {
    DEFAULT_CYCLE_INTERVAL_MS
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            trigger_interval_ms: default_trigger_interval_ms(),
            cycle_interval_ms: default_cycle_interval_ms(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl ProfilerConfig {
    /// Parse a JSON object; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ProfilerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_trigger_interval(mut self, interval: Duration) -> Self {
        self.trigger_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn trigger_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_interval_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger_interval_ms == 0 {
            return Err(ConfigError::ZeroTriggerInterval);
        }
        if self.cycle_interval_ms == 0 {
            return Err(ConfigError::ZeroCycleInterval);
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        if self.trigger_interval_ms > self.cycle_interval_ms {
            tracing::warn!(
                trigger_ms = self.trigger_interval_ms,
                cycle_ms = self.cycle_interval_ms,
                "trigger interval exceeds cycle interval; some cycles will hold no samples"
            );
        }
        Ok(())
    }
}

// Sub-millisecond durations truncate to 0 and are rejected by `validate`.
fn duration_ms(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProfilerConfig::default();
        assert_eq!(config.trigger_interval(), Duration::from_millis(10));
        assert_eq!(config.cycle_interval(), Duration::from_secs(1));
        assert_eq!(config.history_capacity, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = ProfilerConfig::from_json(r#"{"cycle_interval_ms": 50}"#)
            .expect("partial config should parse");
        assert_eq!(config.cycle_interval_ms, 50);
        assert_eq!(config.trigger_interval_ms, DEFAULT_TRIGGER_INTERVAL_MS);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn json_rejects_garbage() {
        assert!(matches!(
            ProfilerConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_zero_values() {
        let zero_trigger = ProfilerConfig::default().with_trigger_interval(Duration::ZERO);
        assert!(matches!(
            zero_trigger.validate(),
            Err(ConfigError::ZeroTriggerInterval)
        ));

        let zero_cycle = ProfilerConfig::default().with_cycle_interval(Duration::from_micros(500));
        assert!(matches!(
            zero_cycle.validate(),
            Err(ConfigError::ZeroCycleInterval)
        ));

        let zero_capacity = ProfilerConfig::default().with_history_capacity(0);
        assert!(matches!(
            zero_capacity.validate(),
            Err(ConfigError::ZeroHistoryCapacity)
        ));
    }

    #[test]
    fn error_messages_are_descriptive() {
        assert_eq!(
            ConfigError::ZeroHistoryCapacity.to_string(),
            "history capacity must be at least 1 entry"
        );
    }
}
