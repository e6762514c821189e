//! HELLO message wire layout.
//!
//! ```text
//! 0        1                 9        11                16
//! +--------+-----------------+--------+-----------------+
//! |  ecc   |      ebid       |  time  |       mac       |
//! +--------+-----------------+--------+-----------------+
//! ```
//!
//! `time` is the low 16 bits of the sender's NTP seconds timestamp,
//! big-endian. The MAC covers the first 11 bytes; it is verified by the
//! crypto oracle, never here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

use super::bytes::{fixed, time16_from_bytes, time16_to_bytes};

pub const ECC_SIZE: usize = 1;
pub const EBID_SIZE: usize = 8;
pub const TIME_SIZE: usize = 2;
pub const HELLO_MAC_SIZE: usize = 5;
pub const AUTHENTICATED_PAYLOAD_SIZE: usize = ECC_SIZE + EBID_SIZE + TIME_SIZE;
pub const HELLO_SIZE: usize = AUTHENTICATED_PAYLOAD_SIZE + HELLO_MAC_SIZE;

/// Ephemeral Bluetooth identifier: 8 opaque bytes encrypted by the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ebid(pub [u8; EBID_SIZE]);

impl Ebid {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Self(fixed("ebid", bytes)?))
    }

    pub fn as_bytes(&self) -> &[u8; EBID_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Ebid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ebid({})", hex::encode(self.0))
    }
}

/// Encrypted country code, one byte bound to the EBID it travels with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptedCountryCode(pub u8);

impl EncryptedCountryCode {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let [ecc] = fixed::<ECC_SIZE>("ecc", bytes)?;
        Ok(Self(ecc))
    }
}

/// Build the MAC-authenticated buffer `ecc ‖ ebid ‖ time`.
pub fn authenticated_payload(
    ecc: EncryptedCountryCode,
    ebid: &Ebid,
    time16: u16,
) -> [u8; AUTHENTICATED_PAYLOAD_SIZE] {
    let mut payload = [0u8; AUTHENTICATED_PAYLOAD_SIZE];
    payload[0] = ecc.0;
    payload[ECC_SIZE..ECC_SIZE + EBID_SIZE].copy_from_slice(&ebid.0);
    payload[ECC_SIZE + EBID_SIZE..].copy_from_slice(&time16_to_bytes(time16));
    payload
}

/// A complete 16-byte HELLO as broadcast by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloMessage {
    pub ecc: EncryptedCountryCode,
    pub ebid: Ebid,
    pub time: u16,
    pub mac: [u8; HELLO_MAC_SIZE],
}

impl HelloMessage {
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let bytes: [u8; HELLO_SIZE] = fixed("hello", bytes)?;
        let (payload, mac) = bytes.split_at(AUTHENTICATED_PAYLOAD_SIZE);
        let (ecc, rest) = payload.split_at(ECC_SIZE);
        let (ebid, time) = rest.split_at(EBID_SIZE);

        Ok(Self {
            ecc: EncryptedCountryCode::from_slice(ecc)?,
            ebid: Ebid::from_slice(ebid)?,
            time: time16_from_bytes(fixed("time", time)?),
            mac: fixed("mac", mac)?,
        })
    }

    pub fn encode(&self) -> [u8; HELLO_SIZE] {
        let mut bytes = [0u8; HELLO_SIZE];
        bytes[..AUTHENTICATED_PAYLOAD_SIZE].copy_from_slice(&self.authenticated_payload());
        bytes[AUTHENTICATED_PAYLOAD_SIZE..].copy_from_slice(&self.mac);
        bytes
    }

    pub fn authenticated_payload(&self) -> [u8; AUTHENTICATED_PAYLOAD_SIZE] {
        authenticated_payload(self.ecc, &self.ebid, self.time)
    }
}
