pub mod pipeline;

pub use pipeline::SubmissionPipeline;
