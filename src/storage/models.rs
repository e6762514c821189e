//! Stored records.
//!
//! These models represent the documents held by the registration and
//! contact stores. Constructors enforce the record invariants and return a
//! [`ModelError`] instead of building an invalid value.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::codec::{ntp_from_time32, Ebid, EncryptedCountryCode, HelloMessage, MAX_TIME32};
use crate::error::ModelError;

/// Opaque permanent identity of a registered device (`idA`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermanentIdentifier(Vec<u8>);

impl PermanentIdentifier {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ModelError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ModelError::Empty("permanentIdentifier"));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short SHA-256 fingerprint, safe to write to logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.0);
        hex::encode(&digest[..6])
    }
}

impl fmt::Debug for PermanentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermanentIdentifier({})", self.fingerprint())
    }
}

/// One HELLO observation as reported by the receiving device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloMessageDetail {
    pub mac: Vec<u8>,
    /// Low 16 bits of the sender's NTP timestamp.
    pub time_from_hello_message: u16,
    /// Receiver's NTP seconds timestamp (32-bit on the wire, widened).
    /// Records read back from a store are not re-checked against that bound.
    pub time_collected_on_device: u64,
    pub rssi_calibrated: i32,
}

impl HelloMessageDetail {
    pub fn new(
        mac: impl Into<Vec<u8>>,
        time_from_hello_message: u16,
        time_collected_on_device: u64,
        rssi_calibrated: i32,
    ) -> Result<Self, ModelError> {
        let mac = mac.into();
        if mac.is_empty() {
            return Err(ModelError::Empty("mac"));
        }
        if time_collected_on_device > MAX_TIME32 {
            return Err(ModelError::TooLarge {
                field: "timeCollectedOnDevice",
                value: time_collected_on_device,
                max: MAX_TIME32,
            });
        }
        Ok(Self {
            mac,
            time_from_hello_message,
            time_collected_on_device,
            rssi_calibrated,
        })
    }

    /// Detail for a decoded HELLO, with the receiver timestamp as carried
    /// on the wire.
    pub fn from_hello(hello: &HelloMessage, time_collected: [u8; 4], rssi_calibrated: i32) -> Self {
        Self {
            mac: hello.mac.to_vec(),
            time_from_hello_message: hello.time,
            time_collected_on_device: ntp_from_time32(time_collected),
            rssi_calibrated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(String);

impl ContactId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContactId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pending proximity report, waiting to be validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub ebid: Ebid,
    pub ecc: EncryptedCountryCode,
    pub message_details: Vec<HelloMessageDetail>,
}

impl Contact {
    /// Build a contact from raw wire fields. An empty message list is
    /// accepted here; the validator discards such contacts.
    pub fn new(
        ebid: &[u8],
        ecc: &[u8],
        message_details: Vec<HelloMessageDetail>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            id: ContactId::generate(),
            ebid: Ebid::from_slice(ebid)?,
            ecc: EncryptedCountryCode::from_slice(ecc)?,
            message_details,
        })
    }

    pub fn with_id(mut self, id: ContactId) -> Self {
        self.id = id;
        self
    }
}

/// Scores collected for a single epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochExposition {
    pub epoch_id: i32,
    pub exposition_scores: Vec<f64>,
}

impl EpochExposition {
    pub fn new(epoch_id: i32, exposition_scores: Vec<f64>) -> Result<Self, ModelError> {
        if epoch_id < 0 {
            return Err(ModelError::Negative {
                field: "epochId",
                value: i64::from(epoch_id),
            });
        }
        if exposition_scores.is_empty() {
            return Err(ModelError::Empty("expositionScores"));
        }
        Ok(Self {
            epoch_id,
            exposition_scores,
        })
    }
}

/// Durable per-device record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub permanent_identifier: PermanentIdentifier,

    /// Ordered by epoch id, at most one entry per epoch.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub exposed_epochs: Vec<EpochExposition>,

    #[serde(default)]
    pub at_risk: bool,
    #[serde(default)]
    pub is_notified: bool,
    #[serde(default)]
    pub notified_for_current_risk: bool,
    #[serde(default)]
    pub latest_risk_epoch: i32,

    /// NTP seconds, truncated to the day.
    #[serde(default)]
    pub last_contact_timestamp: Option<u64>,

    #[serde(default)]
    pub outdated_risk: bool,
    #[serde(default)]
    pub last_status_request_epoch: i32,
    #[serde(default)]
    pub last_failed_status_request_epoch: i32,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<EpochExposition>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<EpochExposition>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Registration {
    pub fn new(permanent_identifier: PermanentIdentifier) -> Self {
        Self {
            permanent_identifier,
            exposed_epochs: Vec::new(),
            at_risk: false,
            is_notified: false,
            notified_for_current_risk: false,
            latest_risk_epoch: 0,
            last_contact_timestamp: None,
            outdated_risk: false,
            last_status_request_epoch: 0,
            last_failed_status_request_epoch: 0,
        }
    }

    /// Append scores to the exposition of `epoch_id`, creating it at its
    /// ordered position when missing.
    pub fn add_exposure_scores(&mut self, epoch_id: i32, scores: &[f64]) {
        if scores.is_empty() {
            return;
        }
        match self
            .exposed_epochs
            .binary_search_by_key(&epoch_id, |e| e.epoch_id)
        {
            Ok(index) => self.exposed_epochs[index]
                .exposition_scores
                .extend_from_slice(scores),
            Err(index) => self.exposed_epochs.insert(
                index,
                EpochExposition {
                    epoch_id,
                    exposition_scores: scores.to_vec(),
                },
            ),
        }
    }

    pub fn exposition(&self, epoch_id: i32) -> Option<&EpochExposition> {
        self.exposed_epochs.iter().find(|e| e.epoch_id == epoch_id)
    }
}
