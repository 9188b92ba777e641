//! Message pipeline: a registry of pluggable handlers and the dispatch logic
//! that fans each inbound message out to every enabled handler with
//! per-handler fault isolation.
//!
//! Handlers implement [`MessageHandler`]; the built-in set is the console
//! renderer plus notification and speech placeholders.

pub mod console;
pub mod handler;
pub mod notification;
pub mod pipeline;
pub mod speech;

pub use {
    console::ConsoleHandler,
    handler::MessageHandler,
    notification::NotificationHandler,
    pipeline::MessagePipeline,
    speech::SpeechHandler,
};
