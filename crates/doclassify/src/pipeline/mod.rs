pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use context::{DocumentState, PipelineContext};
pub use error::PipelineError;
pub use progress::{
    BroadcastProgress, DocumentProgressEvent, NoopProgress, ProgressEvent, ProgressReporter,
};
pub use runner::{Pipeline, PipelineMode};
