//! Executor configuration.

use std::time::Duration;

use displaydoc::Display;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration errors.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),

    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration of the plan executor.
///
/// Can be created through `serde::Deserialize` from various formats, with
/// [`Configuration::from_yaml`], or inline in Rust code with [`Configuration::builder`].
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Bound on the execution of a query or mutation, and on every subscription event, in
    /// human-readable format; defaults to 30s
    #[serde(
        deserialize_with = "humantime_serde::deserialize",
        serialize_with = "humantime_serde::serialize",
        default = "default_timeout"
    )]
    #[schemars(with = "String", default = "default_timeout")]
    pub timeout: Duration,

    /// Node execution traces
    pub telemetry: Telemetry,

    /// Subscription settings
    pub subscription: Subscription,
}

/// Node execution traces
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Telemetry {
    /// Record every node completion and skip, and expose the records in the
    /// `executionTrace` response extension
    pub expose_trace: bool,
}

/// Subscription settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Subscription {
    /// Number of events after which the subscription stream completes. Unbounded if not set
    pub max_events: Option<usize>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            telemetry: Telemetry::default(),
            subscription: Subscription::default(),
        }
    }
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(
        timeout: Option<Duration>,
        telemetry: Option<Telemetry>,
        subscription: Option<Subscription>,
    ) -> Result<Self, ConfigurationError> {
        let configuration = Self {
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            telemetry: telemetry.unwrap_or_default(),
            subscription: subscription.unwrap_or_default(),
        };
        configuration.validate()
    }

    /// Parses and validates a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let configuration: Configuration =
            serde_yaml::from_str(yaml).map_err(ConfigurationError::DeserializeConfigError)?;
        configuration.validate()
    }

    /// The JSON schema of the configuration.
    pub fn schema() -> RootSchema {
        schemars::schema_for!(Configuration)
    }

    fn validate(self) -> Result<Self, ConfigurationError> {
        if self.timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "timeout must be greater than zero",
                error: format!("{:?}", self.timeout),
            });
        }
        if self.subscription.max_events == Some(0) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "subscription.max_events must be greater than zero",
                error: "0".to_string(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults() {
        let configuration = Configuration::from_yaml("{}").unwrap();
        assert_eq!(configuration, Configuration::default());
        assert_eq!(configuration.timeout, Duration::from_secs(30));
        assert!(!configuration.telemetry.expose_trace);
        assert_eq!(configuration.subscription.max_events, None);
    }

    #[test]
    fn from_yaml() {
        let configuration = Configuration::from_yaml(
            r#"
timeout: 1m 30s
telemetry:
  expose_trace: true
subscription:
  max_events: 10
"#,
        )
        .unwrap();
        assert_eq!(configuration.timeout, Duration::from_secs(90));
        assert!(configuration.telemetry.expose_trace);
        assert_eq!(configuration.subscription.max_events, Some(10));
    }

    #[test]
    fn invalid_configurations() {
        assert!(matches!(
            Configuration::from_yaml("timeout: 0s"),
            Err(ConfigurationError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            Configuration::from_yaml("unknown: true"),
            Err(ConfigurationError::DeserializeConfigError(_))
        ));
        assert!(matches!(
            Configuration::from_yaml("timeout: soon"),
            Err(ConfigurationError::DeserializeConfigError(_))
        ));
    }

    #[test]
    fn builder() {
        let configuration = Configuration::builder()
            .timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(configuration.timeout, Duration::from_millis(250));

        assert!(Configuration::builder()
            .subscription(Subscription {
                max_events: Some(0)
            })
            .build()
            .is_err());
    }

    #[test]
    fn schema_describes_every_option() {
        let schema = serde_json::to_value(Configuration::schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("timeout"));
        assert!(properties.contains_key("telemetry"));
        assert!(properties.contains_key("subscription"));
    }
}
