pub mod identity;
pub mod submission;
