pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("supervisor is already initialized")]
    AlreadyInitialized,

    #[error("supervisor is not initialized")]
    NotInitialized,

    #[error("supervisor is shutting down")]
    ShuttingDown,

    #[error("no teams configured")]
    EmptyFleet,

    #[error("invalid configuration for team {team}: {reason}")]
    InvalidTeam { team: String, reason: String },

    /// Every configured team failed to connect; nothing to stream from.
    #[error("no team could connect ({attempted} attempted)")]
    NoTeamsConnected { attempted: usize },
}
