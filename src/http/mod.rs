//! Outbound HTTP: request description, response classification and the
//! shared pipeline.

pub mod pipeline;
pub mod request;
pub mod response;

pub use pipeline::{BodyCheck, PipelineBuilder, RequestPipeline, REQUEST_ID_HEADER};
pub use request::{canonical_json, segment, ApiRequest};
