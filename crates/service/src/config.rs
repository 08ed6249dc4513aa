use std::time::Duration;

/// Tunables for the fulfillment service.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// How long a buyer or moderator session may sit idle before the
    /// reaper evicts it.
    pub session_ttl: Duration,
    /// Interval between reaper sweeps.
    pub reaper_tick: Duration,
    /// Lifetime of an issued access grant, in days.
    pub grant_duration_days: u64,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(30 * 60),
            reaper_tick: Duration::from_secs(60),
            grant_duration_days: 30,
        }
    }
}

impl FulfillmentConfig {
    /// Reads overrides from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_ttl: Duration::from_secs(env_u64(
                "LINKVEND_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )),
            reaper_tick: Duration::from_secs(env_u64(
                "LINKVEND_REAPER_TICK_SECS",
                defaults.reaper_tick.as_secs(),
            )),
            grant_duration_days: env_u64(
                "LINKVEND_GRANT_DURATION_DAYS",
                defaults.grant_duration_days,
            ),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, raw = %raw, "ignoring unparseable config override");
                default
            }
        },
        Err(_) => default,
    }
}
