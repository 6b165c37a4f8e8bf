//! Utility functions for id generation and bech32 rendering

use super::error::IdError;
use bech32::{Bech32m, Hrp};
use uuid7::{Uuid, uuid7};

// construct a unique id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, IdError> {
    encode_uuid(hrp, &uuid7())
}

pub fn encode_uuid(hrp: &str, id: &Uuid) -> Result<String, IdError> {
    let hrp = Hrp::parse(hrp)?;
    let encoded = bech32::encode::<Bech32m>(hrp, id.as_bytes())?;
    Ok(encoded)
}

/// Reverse of [`encode_uuid`], rejecting strings carrying a different prefix.
pub fn decode_uuid(hrp: &str, encoded: &str) -> Result<Uuid, IdError> {
    let (found, data) = bech32::decode(encoded)?;
    if found.to_string() != hrp {
        return Err(IdError::Prefix {
            expected: hrp.to_string(),
            found: found.to_string(),
        });
    }

    let bytes: [u8; 16] = data
        .as_slice()
        .try_into()
        .map_err(|_| IdError::Length(data.len()))?;

    Ok(Uuid::from(bytes))
}
