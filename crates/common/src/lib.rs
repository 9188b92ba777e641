//! Shared types used across all crosstalk crates.

pub mod sink;
pub mod types;

pub use {
    sink::MessageSink,
    types::{Message, epoch_seconds},
};
