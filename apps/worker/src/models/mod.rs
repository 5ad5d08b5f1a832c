pub mod job;
pub mod queue;
pub mod resume;
