//! Resource addresses (`scheme://authority/path`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Transport a resource is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// JSON datagrams over UDP
    Udp,
    /// Direct dispatch into an in-process registry
    Local,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Udp => "udp",
            Scheme::Local => "local",
        }
    }
}

/// Absolute address of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    scheme: Scheme,
    authority: String,
    /// Always starts with `/`
    path: String,
}

impl Address {
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidAddress(input.to_string());

        let (scheme, rest) = input.split_once("://").ok_or_else(invalid)?;
        let scheme = match scheme {
            "udp" => Scheme::Udp,
            "local" => Scheme::Local,
            _ => return Err(invalid()),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, "/"),
        };
        if authority.is_empty() || authority.contains(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(Self {
            scheme,
            authority: authority.to_string(),
            path: path.to_string(),
        })
    }

    /// Root address of a UDP endpoint
    pub fn udp(endpoint: std::net::SocketAddr) -> Self {
        Self {
            scheme: Scheme::Udp,
            authority: endpoint.to_string(),
            path: "/".to_string(),
        }
    }

    /// Root address of an in-process registry
    pub fn local(name: &str) -> Self {
        Self {
            scheme: Scheme::Local,
            authority: name.to_string(),
            path: "/".to_string(),
        }
    }

    /// Resolve a directory href against this address's scheme and authority
    pub fn join(&self, href: &str) -> Self {
        let path = if href.starts_with('/') {
            href.to_string()
        } else {
            format!("/{href}")
        };
        Self {
            scheme: self.scheme,
            authority: self.authority.clone(),
            path,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Numeric index at the end of the path (`.../pump-2` → 2)
    pub fn index_suffix(&self) -> Option<u32> {
        trailing_index(self.path.trim_end_matches('/'))
    }
}

/// Parse the `-<n>` suffix of an identifier such as `bin-3`
pub fn trailing_index(s: &str) -> Option<u32> {
    let (_, suffix) = s.rsplit_once('-')?;
    suffix.parse().ok()
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme.as_str(), self.authority, self.path)
    }
}

impl FromStr for Address {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}
