//! Vector primitives: records, distance metrics and SIMD kernels.

pub mod distance;
pub mod record;
pub mod simd;

pub use self::distance::{DistanceMetric, normalize, validate_components};
pub use self::record::{RecordId, VectorRecord, payload_summary};
