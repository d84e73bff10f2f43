//! Public types for the Mimir API.

mod document;
mod generation;
mod model;
mod question;
pub mod timestamp;

pub use document::Document;
pub use generation::{
    AttemptResult, GenerationMeta, GenerationResponse, GenerationStatus, KeywordRequest,
    PaperRequest, TopicRequest,
};
pub use model::{ModelDescriptor, PerformanceRecord, Provider};
pub use question::GeneratedQuestion;

/// Exam subjects (General Studies papers I to IV).
pub const SUBJECTS: [&str; 4] = ["GS1", "GS2", "GS3", "GS4"];
