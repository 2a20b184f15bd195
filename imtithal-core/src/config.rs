//! Engine configuration and environment selection.
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authority environment selection.
///
/// Determines the gateway URL the submission client talks to and the
/// certificate template requested during onboarding.
/// - Sandbox: the authority's integration sandbox.
/// - Simulation: the simulation test environment (requires sign-up).
/// - Production: the live environment.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use imtithal_core::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("simulation")?;
/// assert_eq!(env, EnvironmentType::Simulation);
/// # Ok::<(), imtithal_core::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    Sandbox,
    Simulation,
    Production,
}

/// Error returned when parsing an [`EnvironmentType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment type: {input}")]
    Invalid { input: String },
}

impl FromStr for EnvironmentType {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<EnvironmentType, EnvironmentParseError> {
        match env.to_ascii_lowercase().as_str() {
            "sandbox" => Ok(EnvironmentType::Sandbox),
            "simulation" => Ok(EnvironmentType::Simulation),
            "production" => Ok(EnvironmentType::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Sandbox => "sandbox",
            EnvironmentType::Simulation => "simulation",
            EnvironmentType::Production => "production",
        }
    }

    pub fn endpoint_url(&self) -> &'static str {
        match self {
            EnvironmentType::Sandbox => {
                "https://gw-fatoora.zatca.gov.sa/e-invoicing/developer-portal/"
            }
            EnvironmentType::Simulation => {
                "https://gw-fatoora.zatca.gov.sa/e-invoicing/simulation/"
            }
            EnvironmentType::Production => "https://gw-fatoora.zatca.gov.sa/e-invoicing/core/",
        }
    }
}

/// Tunable knobs for submission retries, deadlines, and certificate
/// lifecycle windows. `new` applies the regulatory defaults; tests shrink
/// the timings through the `with_` setters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    env: EnvironmentType,
    clearance_timeout: Duration,
    reporting_timeout: Duration,
    backoff_base: Duration,
    backoff_multiplier: u32,
    backoff_cap: Duration,
    max_clearance_retries: u32,
    reporting_deadline: Duration,
    deadline_alert_window: Duration,
    renewal_window: Duration,
    sweep_interval: Duration,
    worker_concurrency: usize,
}

impl EngineConfig {
    pub fn new(env: EnvironmentType) -> Self {
        Self {
            env,
            clearance_timeout: Duration::from_secs(5),
            reporting_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(30),
            backoff_multiplier: 2,
            backoff_cap: Duration::from_secs(30 * 60),
            max_clearance_retries: 5,
            reporting_deadline: Duration::from_secs(24 * 60 * 60),
            deadline_alert_window: Duration::from_secs(2 * 60 * 60),
            renewal_window: Duration::from_secs(30 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(30),
            worker_concurrency: 4,
        }
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn clearance_timeout(&self) -> Duration {
        self.clearance_timeout
    }

    pub fn reporting_timeout(&self) -> Duration {
        self.reporting_timeout
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    pub fn backoff_multiplier(&self) -> u32 {
        self.backoff_multiplier
    }

    pub fn backoff_cap(&self) -> Duration {
        self.backoff_cap
    }

    pub fn max_clearance_retries(&self) -> u32 {
        self.max_clearance_retries
    }

    pub fn reporting_deadline(&self) -> Duration {
        self.reporting_deadline
    }

    pub fn deadline_alert_window(&self) -> Duration {
        self.deadline_alert_window
    }

    pub fn renewal_window(&self) -> Duration {
        self.renewal_window
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn worker_concurrency(&self) -> usize {
        self.worker_concurrency
    }

    pub fn with_clearance_timeout(mut self, timeout: Duration) -> Self {
        self.clearance_timeout = timeout;
        self
    }

    pub fn with_reporting_timeout(mut self, timeout: Duration) -> Self {
        self.reporting_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, multiplier: u32, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_multiplier = multiplier;
        self.backoff_cap = cap;
        self
    }

    pub fn with_max_clearance_retries(mut self, retries: u32) -> Self {
        self.max_clearance_retries = retries;
        self
    }

    pub fn with_reporting_deadline(mut self, deadline: Duration, alert_window: Duration) -> Self {
        self.reporting_deadline = deadline;
        self.deadline_alert_window = alert_window;
        self
    }

    pub fn with_renewal_window(mut self, window: Duration) -> Self {
        self.renewal_window = window;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_worker_concurrency(mut self, workers: usize) -> Self {
        self.worker_concurrency = workers;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::new(EnvironmentType::Sandbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_names() {
        assert_eq!(
            EnvironmentType::from_str("SANDBOX").ok(),
            Some(EnvironmentType::Sandbox)
        );
        assert_eq!(
            EnvironmentType::from_str("production").ok(),
            Some(EnvironmentType::Production)
        );
        assert!(EnvironmentType::from_str("staging").is_err());
    }

    #[test]
    fn round_trips_as_str() {
        for env in [
            EnvironmentType::Sandbox,
            EnvironmentType::Simulation,
            EnvironmentType::Production,
        ] {
            assert_eq!(EnvironmentType::from_str(env.as_str()).ok(), Some(env));
        }
    }

    #[test]
    fn defaults_match_regulatory_windows() {
        let config = EngineConfig::new(EnvironmentType::Sandbox);
        assert_eq!(config.clearance_timeout(), Duration::from_secs(5));
        assert_eq!(config.reporting_deadline(), Duration::from_secs(86_400));
        assert_eq!(config.deadline_alert_window(), Duration::from_secs(7_200));
        assert_eq!(config.backoff_multiplier(), 2);
    }

    #[test]
    fn setters_override_defaults() {
        let config = EngineConfig::new(EnvironmentType::Simulation)
            .with_backoff(Duration::from_millis(10), 3, Duration::from_millis(100))
            .with_max_clearance_retries(2);
        assert_eq!(config.backoff_base(), Duration::from_millis(10));
        assert_eq!(config.backoff_multiplier(), 3);
        assert_eq!(config.max_clearance_retries(), 2);
    }
}
