pub mod pipeline;
pub mod scorer;

pub use pipeline::{AnalysisReport, AnalyzeError, Pipeline, Stage, StageError};
