pub mod config;
pub mod decoder;
pub mod emitter;
pub mod error;
pub mod gate;
pub mod launcher;
pub mod multiplexer;
pub mod pipeline;
pub mod synthesizer;

pub use config::PipelineConfig;
pub use emitter::{ChunkSink, EventEmitter};
pub use error::PipelineError;
pub use pipeline::{AnalysisPipeline, LaunchedAnalysis};
