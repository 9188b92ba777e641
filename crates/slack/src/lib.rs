//! Per-team streaming client.
//!
//! One [`TeamClient`] per workspace: it owns the socket-mode session, keeps
//! the channel directory cache in sync with the configured subscription set,
//! classifies every failure (transient vs. permanent vs. per-channel), and
//! turns raw transport events into [`crosstalk_common::Message`]s for the
//! sink. The production transport is slack-morphism socket mode; tests drive
//! the same client through scripted in-memory transports.

pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod socket;
pub mod transport;

pub use {
    classify::{SkipReason, SkippedChannel, is_auth_error, skip_reason},
    client::{ClientEvent, ClientStatus, TeamClient, backoff_delay},
    config::TeamConfig,
    error::{Error, Result},
    socket::{SlackSession, SlackTransportFactory},
    transport::{
        ChannelInfo, Directory, InboundEvent, SocketTransport, TransportError, TransportEvent,
        TransportFactory, UserInfo,
    },
};
