//! Scoring algorithm, version 2.
//!
//! Per contact:
//! 1. RSSI values are bucketed per minute since the first message. Values
//!    above -5 dBm are dropped as invalid, the rest are capped at
//!    `rssi_max` to cut peaks.
//! 2. Each minute is smoothed with a soft-max over a two-minute window
//!    (the last minute only sees itself).
//! 3. Each non-empty window gives a risk `(softmax - p0) / delta[n]`
//!    clamped to `[0, 1]`, where `n` is the number of samples in the
//!    window.
//! 4. The contact score is `min(softmax_b(risks) * 1.2, 1) * duration`,
//!    duration being the last minute with samples.
//!
//! Scores aggregate as `1 - exp(-r0 * sum)`.

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::storage::HelloMessageDetail;

use super::strategy::ScoringStrategy;

/// Calibrated RSSI above this value is not a real measurement.
const RSSI_CEILING: i32 = -5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct V2Parameters {
    pub r0: f64,
    pub rssi_max: i32,
    pub p0: f64,
    pub soft_max_a: f64,
    pub soft_max_b: f64,
    pub deltas: Vec<f64>,
    /// Extra seconds allowed past one epoch between the first and last
    /// message of a contact.
    pub epoch_tolerance: i64,
}

impl Default for V2Parameters {
    fn default() -> Self {
        Self {
            r0: 0.0071,
            rssi_max: -35,
            p0: -66.0,
            soft_max_a: 4.342,
            soft_max_b: 0.2,
            deltas: vec![39.0, 27.0, 23.0, 21.0, 20.0, 15.0],
            epoch_tolerance: 180,
        }
    }
}

impl V2Parameters {
    pub fn validate(&self, epoch_duration_secs: u32) -> Result<(), ScoringError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if epoch_duration_secs < 60 {
            return Err(ScoringError::InvalidParameter("epochDurationSecs"));
        }
        if !positive(self.r0) {
            return Err(ScoringError::InvalidParameter("r0"));
        }
        if !positive(self.soft_max_a) {
            return Err(ScoringError::InvalidParameter("softMaxA"));
        }
        if !positive(self.soft_max_b) {
            return Err(ScoringError::InvalidParameter("softMaxB"));
        }
        if self.deltas.is_empty() || !self.deltas.iter().all(|d| positive(*d)) {
            return Err(ScoringError::InvalidParameter("deltas"));
        }
        if self.epoch_tolerance < 0 {
            return Err(ScoringError::InvalidParameter("epochTolerance"));
        }
        Ok(())
    }
}

/// Outcome of scoring one contact.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringResult {
    pub rssi_score: f64,
    /// Minutes of exposure.
    pub duration: usize,
    /// Windows with a non-zero risk.
    pub nb_contacts: usize,
}

impl ScoringResult {
    fn zero() -> Self {
        Self {
            rssi_score: 0.0,
            duration: 0,
            nb_contacts: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoringV2 {
    parameters: V2Parameters,
    epoch_duration_minutes: usize,
}

impl ScoringV2 {
    /// Parameters are expected to be validated against the epoch duration.
    pub fn new(parameters: V2Parameters, epoch_duration_secs: u32) -> Self {
        Self {
            parameters,
            epoch_duration_minutes: (epoch_duration_secs / 60).max(1) as usize,
        }
    }

    pub fn evaluate(&self, messages: &[HelloMessageDetail]) -> Result<ScoringResult, ScoringError> {
        let (first, last) = match (messages.first(), messages.last()) {
            (Some(first), Some(last)) => (
                first.time_collected_on_device as i64,
                last.time_collected_on_device as i64,
            ),
            _ => {
                log::error!("{}", ScoringError::NoMessages);
                return Err(ScoringError::NoMessages);
            }
        };

        let minutes = self.epoch_duration_minutes;
        let span = last - first;
        if span > minutes as i64 * 60 + self.parameters.epoch_tolerance {
            log::warn!(
                "Skip contact because some hello messages are coming too late: \
                 {} sec after first message",
                span
            );
            return Ok(ScoringResult::zero());
        }

        let mut by_minute: Vec<Vec<f64>> = vec![Vec::new(); minutes];
        for message in messages {
            let delta = message.time_collected_on_device as i64 - first;
            let mut minute = delta.div_euclid(60);
            if minute > minutes as i64 {
                minute = minutes as i64 - 1;
            }
            if minute < 0 || minute >= minutes as i64 || message.rssi_calibrated > RSSI_CEILING {
                continue;
            }
            let rssi = message.rssi_calibrated.min(self.parameters.rssi_max);
            by_minute[minute as usize].push(f64::from(rssi));
        }

        let windows = (0..minutes).map(|k| {
            let window: Vec<f64> = by_minute[k]
                .iter()
                .chain(by_minute.get(k + 1).into_iter().flatten())
                .copied()
                .collect();
            (soft_max(&window, self.parameters.soft_max_a), window.len())
        });

        let last_delta = self.parameters.deltas.len() - 1;
        let mut duration = 0;
        let mut nb_contacts = 0;
        let mut risks = Vec::new();
        for (minute, (smoothed, samples)) in windows.enumerate() {
            if samples == 0 {
                continue;
            }
            duration = minute;
            let gamma =
                (smoothed - self.parameters.p0) / self.parameters.deltas[samples.min(last_delta)];
            let risk = gamma.clamp(0.0, 1.0);
            if risk > 0.0 {
                nb_contacts += 1;
            }
            risks.push(risk);
        }

        let peak = (soft_max(&risks, self.parameters.soft_max_b) * 1.2).min(1.0);
        Ok(ScoringResult {
            rssi_score: peak * duration as f64,
            duration,
            nb_contacts,
        })
    }
}

/// `a * ln(mean(exp(v / a)))`, 0 for an empty list.
fn soft_max(values: &[f64], a: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|v| (v / a).exp()).sum();
    a * (sum / values.len() as f64).ln()
}

impl ScoringStrategy for ScoringV2 {
    fn score(&self, messages: &[HelloMessageDetail]) -> Result<Vec<f64>, ScoringError> {
        Ok(vec![self.evaluate(messages)?.rssi_score])
    }

    fn aggregate(&self, scores: &[f64]) -> f64 {
        let sum: f64 = scores.iter().sum();
        1.0 - (-self.parameters.r0 * sum).exp()
    }
}
