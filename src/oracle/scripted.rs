//! Scripted oracle for tests and benchmarks.
//!
//! Answers are keyed by EBID. An EBID with no script resolves to the
//! "unknown identity" error, like a real oracle facing a foreign EBID.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::codec::Ebid;
use crate::error::OracleError;

use super::messages::{
    OracleErrorDetail, ValidateContactRequest, ValidateContactResponse, UNKNOWN_IDENTITY_CODE,
};
use super::CryptoOracle;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedAnswer {
    Resolve {
        id_a: Vec<u8>,
        country_code: u8,
        epoch_id: i32,
        /// MACs the oracle reports as invalid.
        invalid_macs: Vec<Vec<u8>>,
    },
    Error {
        code: i32,
        description: String,
    },
    Unavailable,
    Empty,
}

#[derive(Debug, Default)]
pub struct ScriptedOracle {
    answers: RwLock<HashMap<Ebid, ScriptedAnswer>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, ebid: Ebid, answer: ScriptedAnswer) {
        self.answers.write().insert(ebid, answer);
    }

    /// Resolve `ebid` to `id_a` at `epoch_id`, with every MAC valid.
    pub fn resolve(&self, ebid: Ebid, id_a: &[u8], country_code: u8, epoch_id: i32) {
        self.script(
            ebid,
            ScriptedAnswer::Resolve {
                id_a: id_a.to_vec(),
                country_code,
                epoch_id,
                invalid_macs: Vec::new(),
            },
        );
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CryptoOracle for ScriptedOracle {
    fn validate_contact(
        &self,
        request: &ValidateContactRequest,
    ) -> Result<Option<ValidateContactResponse>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let answer = self.answers.read().get(&request.ebid).cloned();
        match answer {
            None => Ok(Some(ValidateContactResponse {
                error: Some(OracleErrorDetail {
                    code: UNKNOWN_IDENTITY_CODE,
                    description: "Unable to find registration".to_string(),
                }),
                ..Default::default()
            })),
            Some(ScriptedAnswer::Resolve {
                id_a,
                country_code,
                epoch_id,
                invalid_macs,
            }) => Ok(Some(ValidateContactResponse {
                id_a: Some(id_a),
                country_code: Some(country_code),
                epoch_id,
                invalid_hello_message_details: request
                    .hello_message_details
                    .iter()
                    .filter(|check| invalid_macs.contains(&check.mac))
                    .cloned()
                    .collect(),
                error: None,
            })),
            Some(ScriptedAnswer::Error { code, description }) => Ok(Some(ValidateContactResponse {
                error: Some(OracleErrorDetail { code, description }),
                ..Default::default()
            })),
            Some(ScriptedAnswer::Unavailable) => {
                Err(OracleError::Unavailable("scripted outage".to_string()))
            }
            Some(ScriptedAnswer::Empty) => Ok(None),
        }
    }
}
