use serde::{Deserialize, Serialize};

/// A single chat message after demultiplexing, ready for handler dispatch.
///
/// Produced by a team client, surrendered to the pipeline. Handlers receive
/// borrowed views and must not hold on to them past `handle` returning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Team the message arrived from.
    pub team: String,
    /// Resolved channel display name (falls back to the raw channel id).
    pub channel_name: String,
    /// Raw platform channel id.
    pub channel_id: String,
    /// Resolved author display name (falls back to the raw user id).
    pub user: String,
    /// Message body as delivered by the platform.
    pub text: String,
    /// Upstream platform timestamp, verbatim (e.g. "1712345678.000200").
    pub ts: String,
    /// Fractional epoch seconds derived from `ts`; the ordering key.
    pub wall_time: f64,
}

impl Message {
    /// Build a message, deriving `wall_time` from the platform timestamp.
    pub fn new(
        team: impl Into<String>,
        channel_name: impl Into<String>,
        channel_id: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
        ts: impl Into<String>,
    ) -> Self {
        let ts = ts.into();
        let wall_time = epoch_seconds(&ts);
        Self {
            team: team.into(),
            channel_name: channel_name.into(),
            channel_id: channel_id.into(),
            user: user.into(),
            text: text.into(),
            ts,
            wall_time,
        }
    }
}

/// Parse a platform timestamp ("seconds.fraction") into fractional epoch
/// seconds. Unparseable input yields 0.0 so such messages sort first rather
/// than poisoning comparisons with NaN.
pub fn epoch_seconds(ts: &str) -> f64 {
    ts.trim().parse::<f64>().ok().filter(|t| t.is_finite()).unwrap_or(0.0)
}
