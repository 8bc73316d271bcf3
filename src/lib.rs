#![forbid(unsafe_code)]

//! Slack mention relay.
//!
//! A listener turns Slack `app_mention` events into queue envelopes; a
//! worker drains the queue, runs each mention through an LLM intent
//! pipeline, posts the reply and optionally files a follow-up task.
//! Delivery is at-least-once and the worker is idempotent per mention.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod http;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod queue;
pub mod relay;
pub mod role;
pub mod slack;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
