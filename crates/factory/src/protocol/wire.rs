//! Datagram encoding
//!
//! Each request and each response is one UDP datagram holding a JSON object.
//! The `id` pairs a response with its request.

use serde::{Deserialize, Serialize};

use super::{Method, ProtocolResult, ResponseCode};

/// Largest datagram either side will send or accept
pub const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: u32,
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: u32,
    pub code: ResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

pub fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode_request(datagram: &[u8]) -> ProtocolResult<WireRequest> {
    Ok(serde_json::from_slice(datagram)?)
}

pub fn decode_response(datagram: &[u8]) -> ProtocolResult<WireResponse> {
    Ok(serde_json::from_slice(datagram)?)
}

/// Best-effort id recovery from a datagram that failed to decode
pub fn salvage_id(datagram: &[u8]) -> Option<u32> {
    let value: serde_json::Value = serde_json::from_slice(datagram).ok()?;
    value.get("id")?.as_u64()?.try_into().ok()
}
