//! The stored unit: an id, a vector and an optional opaque payload.

use serde::{Deserialize, Serialize};

/// Identifier of a record within its table. Assigned in insertion order.
pub type RecordId = u64;

/// An immutable vector record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: RecordId,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

impl VectorRecord {
    pub fn new(id: RecordId, vector: Vec<f32>, payload: Option<Vec<u8>>) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        self.payload
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

const SUMMARY_LIMIT: usize = 32;

/// Short human-readable rendering of a payload: UTF-8 text when possible,
/// hex otherwise, cut to a fixed number of bytes.
pub fn payload_summary(payload: Option<&[u8]>) -> String {
    let Some(bytes) = payload else {
        return String::new();
    };
    let truncated = bytes.len() > SUMMARY_LIMIT;
    let head = &bytes[..bytes.len().min(SUMMARY_LIMIT)];
    let mut summary = match std::str::from_utf8(head) {
        Ok(text) => text.to_string(),
        // A cut may land inside a multi-byte character of otherwise valid text.
        Err(e) if truncated && e.error_len().is_none() => {
            String::from_utf8_lossy(&head[..e.valid_up_to()]).into_owned()
        }
        Err(_) => head.iter().map(|b| format!("{b:02x}")).collect(),
    };
    if truncated {
        summary.push_str("...");
    }
    summary
}
