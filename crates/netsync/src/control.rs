//! Out-of-band messages between observers and the server.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum ControlMessage {
    /// Ask the server to forget this observer's baselines.
    RequestFullSync,
    Subscribe { key: String },
    Unsubscribe { key: String },
    RequestData { key: String },
    UpdateData { key: String, payload: Vec<u8> },
    /// A keyed batch, see [`crate::wire::read_keyed_batch`].
    BatchUpdate(Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

impl ControlMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ControlError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(ControlError::Serialize)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ControlError> {
        // Archived data must be aligned; transport buffers need not be.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(ControlError::Deserialize)
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Subscribe { key }
            | Self::Unsubscribe { key }
            | Self::RequestData { key }
            | Self::UpdateData { key, .. } => Some(key),
            Self::RequestFullSync | Self::BatchUpdate(_) => None,
        }
    }
}
