//! Engine configuration.
//!
//! Loaded once at startup from JSON (camelCase keys) and passed by value
//! to the components that need it. Every problem found here is fatal.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clock::{RobertClock, SECONDS_PER_DAY};
use crate::error::ConfigError;
use crate::pipeline::BatchMode;
use crate::scoring::ScoringAlgorithm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RobertConfig {
    pub epoch_duration_secs: u32,
    /// `YYYY-MM-DD`, the service starts at 00:00:00 UTC that day.
    pub service_start_date: String,
    pub server_country_code: u8,
    /// Seconds allowed between a HELLO's send and receive timestamps.
    pub hello_message_timestamp_tolerance: u64,
    pub contagious_period_days: u32,
    pub risk_threshold: f64,
    pub risk_level_retention_period_days: u32,
    pub batch_mode: BatchMode,
    /// Size of the batch thread pool; rayon's default when unset.
    pub worker_threads: Option<usize>,
    pub scoring: ScoringAlgorithm,
}

impl Default for RobertConfig {
    fn default() -> Self {
        Self {
            epoch_duration_secs: 900,
            service_start_date: "2020-06-01".to_string(),
            server_country_code: 33,
            hello_message_timestamp_tolerance: 180,
            contagious_period_days: 14,
            risk_threshold: 0.1,
            risk_level_retention_period_days: 7,
            batch_mode: BatchMode::default(),
            worker_threads: None,
            scoring: ScoringAlgorithm::default(),
        }
    }
}

impl RobertConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epoch_duration_secs == 0 {
            return Err(ConfigError::invalid("epochDurationSecs", "must be greater than 0"));
        }
        if SECONDS_PER_DAY % i64::from(self.epoch_duration_secs) != 0 {
            return Err(ConfigError::invalid(
                "epochDurationSecs",
                "must divide a day evenly",
            ));
        }
        self.clock()?;
        if self.hello_message_timestamp_tolerance == 0 {
            return Err(ConfigError::invalid(
                "helloMessageTimestampTolerance",
                "must be greater than 0",
            ));
        }
        if self.contagious_period_days == 0 {
            return Err(ConfigError::invalid("contagiousPeriodDays", "must be greater than 0"));
        }
        if self.risk_level_retention_period_days == 0 {
            return Err(ConfigError::invalid(
                "riskLevelRetentionPeriodDays",
                "must be greater than 0",
            ));
        }
        if !self.risk_threshold.is_finite() || self.risk_threshold <= 0.0 {
            return Err(ConfigError::invalid(
                "riskThreshold",
                format!("must be a positive number, got {}", self.risk_threshold),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(ConfigError::invalid("workerThreads", "must be greater than 0"));
        }
        self.scoring
            .validate(self.epoch_duration_secs)
            .map_err(|e| ConfigError::invalid("scoring", e.to_string()))
    }

    pub fn clock(&self) -> Result<RobertClock, ConfigError> {
        RobertClock::from_start_date(&self.service_start_date, self.epoch_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RobertConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clock().unwrap().epochs_per_day(), 96);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RobertConfig::from_json_str(
            r#"{"riskThreshold": 0.2, "batchMode": "FULL_REGISTRATION_SCAN_COMPUTE_RISK"}"#,
        )
        .unwrap();
        assert_eq!(config.risk_threshold, 0.2);
        assert_eq!(config.batch_mode, BatchMode::FullRegistrationScanComputeRisk);
        assert_eq!(config.contagious_period_days, 14);
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        let cases = [
            (r#"{"epochDurationSecs": 0}"#, "epochDurationSecs"),
            (r#"{"epochDurationSecs": 7}"#, "epochDurationSecs"),
            (r#"{"serviceStartDate": "June 1st"}"#, "serviceStartDate"),
            (r#"{"helloMessageTimestampTolerance": 0}"#, "helloMessageTimestampTolerance"),
            (r#"{"contagiousPeriodDays": 0}"#, "contagiousPeriodDays"),
            (r#"{"riskThreshold": 0.0}"#, "riskThreshold"),
            (r#"{"riskLevelRetentionPeriodDays": 0}"#, "riskLevelRetentionPeriodDays"),
            (r#"{"workerThreads": 0}"#, "workerThreads"),
            (r#"{"scoring": {"version": "v2", "deltas": []}}"#, "scoring"),
        ];
        for (json, expected_field) in cases {
            match RobertConfig::from_json_str(json) {
                Err(ConfigError::Invalid { field, .. }) => {
                    assert_eq!(field, expected_field, "{}", json)
                }
                other => panic!("{} gave {:?}", json, other),
            }
        }
    }

    #[test]
    fn test_unparsable_json() {
        assert!(matches!(
            RobertConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RobertConfig::from_file("/nonexistent/robert.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
