//! Messages submitted by producers

use crate::error::{IndexerError, Result};
use serde::{Deserialize, Serialize};

/// Routing metadata for a message payload.
///
/// `index` is required; `id` and `doc_type` are optional and passed through
/// to the backend when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

/// A document routed to the index named in its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a message for `index` with a backend-assigned id.
    pub fn new(index: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            header: MessageHeader {
                index: Some(index.into()),
                ..MessageHeader::default()
            },
            payload: payload.into(),
        }
    }

    /// Create a message from an explicit header.
    pub fn with_header(header: MessageHeader, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// Set an explicit document id (builder style)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.header.id = Some(id.into());
        self
    }

    /// Set a legacy mapping type (builder style)
    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.header.doc_type = Some(doc_type.into());
        self
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// The destination index, if one is set and non-empty.
    pub fn index(&self) -> Option<&str> {
        self.header.index.as_deref().filter(|index| !index.is_empty())
    }

    /// Check that the message can be routed.
    pub fn validate(&self) -> Result<()> {
        if self.index().is_none() {
            return Err(IndexerError::invalid_message(
                self.size(),
                "no index provided in header",
            ));
        }
        Ok(())
    }
}
