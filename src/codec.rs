//! Payload encoding for request chains, replies and published messages.

use crate::error::{Result, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;

/// Wire format shared by every socket of one transport context.
///
/// JSON is the default. MessagePack uses named (map-based) encoding so field
/// order never matters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    #[default]
    Json,
    MsgPack,
}

impl WireFormat {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            WireFormat::Json => {
                serde_json::to_vec(value).map_err(|e| RpcError::Encode(e.to_string()))
            }
            WireFormat::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            WireFormat::Json => {
                serde_json::from_slice(data).map_err(|e| RpcError::Decode(e.to_string()))
            }
            WireFormat::MsgPack => Ok(rmp_serde::from_slice(data)?),
        }
    }
}

impl FromStr for WireFormat {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "msgpack" | "messagepack" => Ok(WireFormat::MsgPack),
            other => Err(RpcError::Decode(format!("unknown wire format '{}'", other))),
        }
    }
}
