//! Payload encodings for the arguments and results of each opcode.
//!
//! Identifiers are 8 bytes big-endian, descriptors use their own length-prefixed
//! form, an absent descriptor is an empty payload and booleans are one byte.

use crate::chord::descriptor::PeerDescriptor;
use crate::chord::types::{IdSpace, Identifier};
use crate::error::MessageError;
use bytes::Bytes;

pub fn empty() -> Bytes {
    Bytes::new()
}

pub fn expect_empty(payload: &[u8]) -> Result<(), MessageError> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(MessageError::MalformedRequest(format!(
            "expected no arguments, got {} bytes",
            payload.len()
        )))
    }
}

pub fn encode_identifier(id: Identifier) -> Bytes {
    Bytes::copy_from_slice(&id.to_bytes())
}

pub fn decode_identifier(payload: &[u8], space: &IdSpace) -> Result<Identifier, MessageError> {
    let raw: [u8; 8] = payload.try_into().map_err(|_| {
        MessageError::MalformedRequest(format!("identifier must be 8 bytes, got {}", payload.len()))
    })?;
    let value = u64::from_be_bytes(raw);
    space.identifier(value).ok_or_else(|| {
        MessageError::MalformedRequest(format!(
            "identifier {} outside a {}-bit ring",
            value,
            space.bits()
        ))
    })
}

pub fn encode_peer(peer: &PeerDescriptor) -> Bytes {
    peer.serialize()
}

pub fn decode_peer(payload: &[u8], space: &IdSpace) -> Result<PeerDescriptor, MessageError> {
    PeerDescriptor::deserialize(payload, space)
}

pub fn encode_optional_peer(peer: Option<&PeerDescriptor>) -> Bytes {
    peer.map(PeerDescriptor::serialize).unwrap_or_default()
}

pub fn decode_optional_peer(
    payload: &[u8],
    space: &IdSpace,
) -> Result<Option<PeerDescriptor>, MessageError> {
    if payload.is_empty() {
        return Ok(None);
    }
    decode_peer(payload, space).map(Some)
}

pub fn encode_bool(value: bool) -> Bytes {
    Bytes::from_static(if value { &[1] } else { &[0] })
}

pub fn decode_bool(payload: &[u8]) -> Result<bool, MessageError> {
    match payload {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(MessageError::MalformedRequest(format!(
            "invalid boolean payload {}",
            hex::encode(payload)
        ))),
    }
}
