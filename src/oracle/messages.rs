//! Request and response exchanged with the crypto oracle.

use serde::{Deserialize, Serialize};

use crate::codec::{Ebid, EncryptedCountryCode};
use crate::storage::{Contact, HelloMessageDetail};

/// HTTP-like status the oracle uses for an identity it cannot resolve.
pub const UNKNOWN_IDENTITY_CODE: i32 = 404;

/// The part of a HELLO the oracle needs to check its MAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloMessageCheck {
    pub mac: Vec<u8>,
    pub time_sent: u16,
    pub time_received: u64,
}

impl HelloMessageCheck {
    pub fn matches(&self, detail: &HelloMessageDetail) -> bool {
        self.mac == detail.mac
            && self.time_sent == detail.time_from_hello_message
            && self.time_received == detail.time_collected_on_device
    }
}

impl From<&HelloMessageDetail> for HelloMessageCheck {
    fn from(detail: &HelloMessageDetail) -> Self {
        Self {
            mac: detail.mac.clone(),
            time_sent: detail.time_from_hello_message,
            time_received: detail.time_collected_on_device,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateContactRequest {
    pub ebid: Ebid,
    pub ecc: EncryptedCountryCode,
    pub server_country_code: u8,
    pub hello_message_details: Vec<HelloMessageCheck>,
}

impl ValidateContactRequest {
    pub fn for_contact(contact: &Contact, server_country_code: u8) -> Self {
        Self {
            ebid: contact.ebid,
            ecc: contact.ecc,
            server_country_code,
            hello_message_details: contact
                .message_details
                .iter()
                .map(HelloMessageCheck::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleErrorDetail {
    pub code: i32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateContactResponse {
    pub id_a: Option<Vec<u8>>,
    pub country_code: Option<u8>,
    pub epoch_id: i32,
    #[serde(default)]
    pub invalid_hello_message_details: Vec<HelloMessageCheck>,
    pub error: Option<OracleErrorDetail>,
}
