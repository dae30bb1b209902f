//! Query responses.
//!
//! A query never returns a Rust error to its caller. Failures are folded
//! into a [`ResponseCode`] next to an empty result list.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::VdbError;
use crate::vector::{RecordId, VectorRecord, payload_summary};

/// Outcome of a query. The numeric values are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ResponseCode {
    Ok = 0,
    TableNotFound = 1,
    DimensionMismatch = 2,
    InvalidArgument = 3,
    StorageUnavailable = 4,
    StorageCorrupt = 5,
}

impl ResponseCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ResponseCode::Ok
    }

    pub fn name(self) -> &'static str {
        match self {
            ResponseCode::Ok => "OK",
            ResponseCode::TableNotFound => "TableNotFound",
            ResponseCode::DimensionMismatch => "DimensionMismatch",
            ResponseCode::InvalidArgument => "InvalidArgument",
            ResponseCode::StorageUnavailable => "StorageUnavailable",
            ResponseCode::StorageCorrupt => "StorageCorrupt",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<ResponseCode> for i32 {
    fn from(code: ResponseCode) -> Self {
        code.as_i32()
    }
}

/// One ranked neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: RecordId,
    pub distance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

impl QueryResult {
    pub(crate) fn from_record(record: &Arc<VectorRecord>, distance: f32) -> Self {
        Self {
            id: record.id,
            distance,
            payload: record.payload.clone(),
        }
    }

    /// One-line rendering, e.g. `{distance:0.141421, id:2, payload:doc-2}`.
    pub fn to_display_string(&self) -> String {
        format!(
            "{{distance:{:.6}, id:{}, payload:{}}}",
            self.distance,
            self.id,
            payload_summary(self.payload.as_deref())
        )
    }
}

/// Response of a KNN query: a code plus results ordered by ascending
/// distance, then ascending id. Results are empty unless the code is `Ok`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub code: ResponseCode,
    pub results: Vec<QueryResult>,
}

impl Response {
    pub fn ok(results: Vec<QueryResult>) -> Self {
        Self {
            code: ResponseCode::Ok,
            results,
        }
    }

    pub fn error(code: ResponseCode) -> Self {
        Self {
            code,
            results: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// The binding-style `(code, results)` pair.
    pub fn into_parts(self) -> (i32, Vec<QueryResult>) {
        (self.code.as_i32(), self.results)
    }
}

impl From<VdbError> for Response {
    fn from(err: VdbError) -> Self {
        Response::error(err.code())
    }
}
