//! Provider adapters, image sniffing and the generation pipeline.

pub mod connection;
pub mod debug;
pub mod error;
pub mod http;
pub mod ingest;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod sniff;

pub use connection::{test_connection, ConnectionReport};
pub use error::GenerationError;
pub use ingest::{deliver, BitmapNodeSink, ColorMode, DeliveryOutcome, IngestReport};
pub use pipeline::{
    compose_prompt, GenerationOutcome, GenerationPipeline, PipelineConfig, ProfileSource,
    TaskCompletion, TaskSet,
};
pub use request::{build_request, WireRequest};
pub use response::{extract_image, ExtractedImage};
pub use sniff::{classify, ImageFormat, SniffResult};
