//! Request/response protocol
//!
//! The controller and the device server exchange small requests (GET, PUT with a
//! `{"status": ...}` body, parameterless POST) addressed by hierarchical path.
//! Everything above this module talks to a [`Transport`]; the two
//! implementations are [`UdpTransport`] (JSON datagrams) and
//! [`crate::simulator::LocalTransport`] (in-process).

mod address;
pub mod link_format;
mod udp;
pub mod wire;

pub use address::{Address, Scheme, trailing_index};
pub use udp::UdpTransport;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Path of the resource directory
pub const WELL_KNOWN_CORE: &str = "/.well-known/core";

/// Field carrying the scalar of a reading
pub const VALUE_FIELD: &str = "v";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Put => f.write_str("PUT"),
            Method::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Content,
    Changed,
    BadRequest,
    NotFound,
    MethodNotAllowed,
}

impl ResponseCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseCode::Content | ResponseCode::Changed)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResponseCode::Content => "2.05 Content",
            ResponseCode::Changed => "2.04 Changed",
            ResponseCode::BadRequest => "4.00 Bad Request",
            ResponseCode::NotFound => "4.04 Not Found",
            ResponseCode::MethodNotAllowed => "4.05 Method Not Allowed",
        };
        f.write_str(text)
    }
}

/// On/off state carried by actuator writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    On,
    Off,
}

/// Body of an actuator PUT: `{"status": "ON"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: SwitchState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub address: Address,
    pub payload: Option<serde_json::Value>,
}

impl Request {
    pub fn get(address: Address) -> Self {
        Self {
            method: Method::Get,
            address,
            payload: None,
        }
    }

    pub fn put(address: Address, payload: serde_json::Value) -> Self {
        Self {
            method: Method::Put,
            address,
            payload: Some(payload),
        }
    }

    pub fn post(address: Address) -> Self {
        Self {
            method: Method::Post,
            address,
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: ResponseCode,
    pub payload: Option<serde_json::Value>,
}

impl Response {
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            payload: None,
        }
    }

    pub fn with_payload(code: ResponseCode, payload: serde_json::Value) -> Self {
        Self {
            code,
            payload: Some(payload),
        }
    }

    /// Turn a non-success code into an error
    pub fn ensure_success(self, address: &Address) -> ProtocolResult<Self> {
        if self.code.is_success() {
            Ok(self)
        } else {
            Err(ProtocolError::Status {
                address: address.to_string(),
                code: self.code,
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("{address} answered {code}")]
    Status { address: String, code: ResponseCode },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error(transparent)]
    LinkFormat(#[from] link_format::LinkFormatError),

    #[error("transport closed")]
    Closed,
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// A request/response channel to resources
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one request and wait for its response, whatever the code
    async fn request(&self, request: Request) -> ProtocolResult<Response>;

    async fn get(&self, address: &Address) -> ProtocolResult<Response> {
        self.request(Request::get(address.clone()))
            .await?
            .ensure_success(address)
    }

    async fn put_status(&self, address: &Address, status: SwitchState) -> ProtocolResult<Response> {
        let payload = serde_json::to_value(StatusPayload { status })?;
        self.request(Request::put(address.clone(), payload))
            .await?
            .ensure_success(address)
    }

    async fn post(&self, address: &Address) -> ProtocolResult<Response> {
        self.request(Request::post(address.clone()))
            .await?
            .ensure_success(address)
    }
}

/// Pull the scalar out of a read response
///
/// Sensors answer with a list of records and the first record's value is used;
/// actuators answer with a single record whose value defaults to 0 when absent.
pub fn extract_reading(payload: &serde_json::Value) -> ProtocolResult<f64> {
    match payload {
        serde_json::Value::Array(records) => records
            .first()
            .and_then(|record| record.get(VALUE_FIELD))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ProtocolError::UnexpectedPayload(payload.to_string())),
        serde_json::Value::Object(record) => match record.get(VALUE_FIELD) {
            None => Ok(0.0),
            Some(v) => v
                .as_f64()
                .ok_or_else(|| ProtocolError::UnexpectedPayload(payload.to_string())),
        },
        _ => Err(ProtocolError::UnexpectedPayload(payload.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_reading_shapes() {
        let senml = json!([{"n": "isola-1-bin-1", "v": 42.5, "u": "%"}, {"v": 1.0}]);
        assert_eq!(extract_reading(&senml).unwrap(), 42.5);

        assert_eq!(extract_reading(&json!({"status": "ON", "v": 1})).unwrap(), 1.0);
        assert_eq!(extract_reading(&json!({"status": "OFF"})).unwrap(), 0.0);
    }

    #[test]
    fn test_extract_reading_rejects_other_shapes() {
        let rejected = [
            json!([]),
            json!([{"n": "x"}]),
            json!({"v": "high"}),
            json!("12"),
            json!(null),
        ];
        for payload in rejected {
            assert!(
                matches!(extract_reading(&payload), Err(ProtocolError::UnexpectedPayload(_))),
                "{payload} should be rejected"
            );
        }
    }

    #[test]
    fn test_status_payload_encoding() {
        let on = serde_json::to_value(StatusPayload { status: SwitchState::On }).unwrap();
        assert_eq!(on, json!({"status": "ON"}));
        let off: StatusPayload = serde_json::from_value(json!({"status": "OFF"})).unwrap();
        assert_eq!(off.status, SwitchState::Off);
        assert!(serde_json::from_value::<StatusPayload>(json!({"status": "MAYBE"})).is_err());
    }

    #[test]
    fn test_ensure_success() {
        let address = Address::parse("udp://h:1/a").unwrap();
        assert!(Response::new(ResponseCode::Changed).ensure_success(&address).is_ok());

        let err = Response::new(ResponseCode::NotFound)
            .ensure_success(&address)
            .unwrap_err();
        assert_eq!(err.to_string(), "udp://h:1/a answered 4.04 Not Found");
    }
}
