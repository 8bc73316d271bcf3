//! Outbound effects of a processed mention: the Slack reply and the
//! optional follow-up task. Neither dispatcher retries; failures go back
//! to the caller.

pub mod notion;
pub mod reply;
pub mod task;

pub use reply::ReplyDispatcher;
pub use task::{NewTask, TaskDispatcher, TaskId, TaskStore};
