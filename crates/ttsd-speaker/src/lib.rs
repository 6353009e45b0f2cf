//! Speaker Engine: the single worker that drains a FIFO queue of speech
//! requests through an [`AudioPipeline`], one at a time.

pub mod client;
pub mod http_pipeline;
pub mod pipeline;
pub mod sanitize;
pub mod speaker;
pub mod url;

pub use client::SpeakerClient;
pub use http_pipeline::HttpAudioPipeline;
pub use pipeline::{AudioPipeline, PipelineError, PipelineMessage, PipelineState};
pub use speaker::Speaker;
pub use url::construct_url;
