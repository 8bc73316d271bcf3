//! Mention delivery: the producer side that enqueues envelopes and the
//! consumer side that drains the queue through the intent pipeline.

pub mod consumer;
pub mod producer;
