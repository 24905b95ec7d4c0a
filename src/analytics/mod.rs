mod decoder;
mod events;
mod motion;
mod pipeline;

pub use decoder::{FrameSource, SourceError, VideoFileSource};
pub use events::MotionEvent;
pub use pipeline::{spawn_analyzer, AnalysisError, AnalysisOutcome, MotionAnalyzer};
