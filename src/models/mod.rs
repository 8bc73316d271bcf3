//! Domain model module declarations.

pub mod envelope;
pub mod intent;
pub mod mention;
pub mod response;
