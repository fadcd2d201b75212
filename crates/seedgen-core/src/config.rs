use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE_PATH: &str = "seedgen.sqlite3";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Load a `.env` file from the working directory if present.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

/// Tunables for the scheduler and its reconciliation loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Start the scheduler and load all policies during bootstrap.
    pub auto_start: bool,
    pub reconcile_interval: Duration,
    /// Pause after the first failed cycle; doubled per consecutive failure.
    pub error_backoff: Duration,
    pub max_error_backoff: Duration,
    /// How long `stop` waits for the reconciliation worker to exit.
    pub stop_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            reconcile_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(10),
            max_error_backoff: Duration::from_secs(80),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    /// Build from `SEEDGEN_*` environment variables (call `load_dotenv()`
    /// first). Unset, unparseable or zero durations keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(env_opt)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let seconds = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            auto_start: lookup("SEEDGEN_SCHEDULER_AUTO_START")
                .and_then(|value| parse_bool(&value))
                .unwrap_or(defaults.auto_start),
            reconcile_interval: seconds(
                "SEEDGEN_RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval,
            ),
            error_backoff: seconds("SEEDGEN_ERROR_BACKOFF_SECS", defaults.error_backoff),
            max_error_backoff: seconds(
                "SEEDGEN_MAX_ERROR_BACKOFF_SECS",
                defaults.max_error_backoff,
            ),
            stop_timeout: seconds("SEEDGEN_STOP_TIMEOUT_SECS", defaults.stop_timeout),
        }
    }

    /// Pause before the next cycle after `consecutive_failures` failed cycles.
    pub fn backoff_after(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(16);
        self.error_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_error_backoff.max(self.error_backoff))
    }
}

/// Process-level settings for the `seedgen` service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    pub log_filter: String,
    pub scheduler: SchedulerConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_opt)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_path: lookup("SEEDGEN_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            log_filter: lookup("SEEDGEN_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            scheduler: SchedulerConfig::from_lookup(&lookup),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{SchedulerConfig, ServiceConfig};

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn unset_environment_yields_defaults() {
        let config = ServiceConfig::from_lookup(|_| None);
        assert_eq!(config.database_path, PathBuf::from("seedgen.sqlite3"));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.scheduler.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.scheduler.error_backoff, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_parsed_and_garbage_is_ignored() {
        let config = SchedulerConfig::from_lookup(lookup_from(&[
            ("SEEDGEN_SCHEDULER_AUTO_START", "off"),
            ("SEEDGEN_RECONCILE_INTERVAL_SECS", "5"),
            ("SEEDGEN_ERROR_BACKOFF_SECS", "soon"),
        ]));
        assert!(!config.auto_start);
        assert_eq!(config.reconcile_interval, Duration::from_secs(5));
        assert_eq!(config.error_backoff, Duration::from_secs(10));
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        let config = SchedulerConfig::from_lookup(lookup_from(&[
            ("SEEDGEN_RECONCILE_INTERVAL_SECS", "0"),
            ("SEEDGEN_ERROR_BACKOFF_SECS", "0"),
            ("SEEDGEN_MAX_ERROR_BACKOFF_SECS", "0"),
            ("SEEDGEN_STOP_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = SchedulerConfig::default();
        assert_eq!(config.backoff_after(1), Duration::from_secs(10));
        assert_eq!(config.backoff_after(2), Duration::from_secs(20));
        assert_eq!(config.backoff_after(4), Duration::from_secs(80));
        assert_eq!(config.backoff_after(40), Duration::from_secs(80));
    }
}
