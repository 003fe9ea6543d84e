//! Value codecs.
//!
//! Record values are opaque bytes to the protocol; a [`Serializer`] turns
//! application values into those bytes and back.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SerializerOp, SeshatError};

pub trait Serializer: Send + Sync + std::fmt::Debug {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| SeshatError::Serializer {
            op: SerializerOp::Serialize,
            message: e.to_string(),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| SeshatError::Serializer {
            op: SerializerOp::Deserialize,
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| SeshatError::Serializer {
            op: SerializerOp::Serialize,
            message: e.to_string(),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| SeshatError::Serializer {
            op: SerializerOp::Deserialize,
            message: e.to_string(),
        })
    }
}

/// Codec selected by configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Json,
    Bincode,
}

impl Serializer for Codec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => JsonSerializer.serialize(value),
            Codec::Bincode => BincodeSerializer.serialize(value),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => JsonSerializer.deserialize(bytes),
            Codec::Bincode => BincodeSerializer.deserialize(bytes),
        }
    }
}
