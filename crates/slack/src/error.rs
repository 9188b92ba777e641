use crate::transport::TransportError;

/// Crate-wide result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No configured channel survived subscription.
    #[error("no subscribable channels for team {team} ({skipped} skipped)")]
    NoValidChannels { team: String, skipped: usize },

    /// Permanent authentication failure; the team is invalidated for the
    /// rest of the process.
    #[error("authentication rejected for team {team}: {source}")]
    AuthRejected {
        team: String,
        #[source]
        source: TransportError,
    },

    /// Transient transport failure; a reconnect has been scheduled if the
    /// attempt budget allows.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
