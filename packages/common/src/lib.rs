pub mod config;
pub mod storage;
pub mod submission;

pub use submission::{FileKind, NewSubmission, Submission, SubmissionFile};
