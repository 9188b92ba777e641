use std::fmt;

use crate::transport::TransportError;

/// Message substrings (matched case-insensitively) that mark a permanent
/// authentication failure.
const AUTH_MESSAGE_PATTERNS: &[&str] = &[
    "invalid_auth",
    "token_revoked",
    "account_inactive",
    "invalid_token",
    "not_authed",
    "token_expired",
    "unauthorized",
    "authentication failed",
    "invalid credentials",
];

/// Platform result codes that mark a permanent authentication failure.
const AUTH_CODES: &[&str] = &["invalid_auth", "token_revoked", "account_inactive"];

/// Whether an error is a permanent authentication failure. A positive answer
/// invalidates the team for the rest of the process; everything else is
/// treated as transient or per-channel.
pub fn is_auth_error(err: &TransportError) -> bool {
    let message = err.message.to_lowercase();
    if AUTH_MESSAGE_PATTERNS.iter().any(|p| message.contains(p)) {
        return true;
    }
    if err
        .code
        .as_deref()
        .is_some_and(|code| AUTH_CODES.contains(&code))
    {
        return true;
    }
    err.status == Some(401) || message.contains("401")
}

/// Why a configured channel was left out of the subscription set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidFormat,
    NotFound,
    NotAMember,
    AccessDenied,
    RateLimited,
    NetworkTimeout,
    PermissionDenied,
    ApiError,
    Unknown,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidFormat => "invalid-format",
            Self::NotFound => "not-found",
            Self::NotAMember => "not-a-member",
            Self::AccessDenied => "access-denied",
            Self::RateLimited => "rate-limited",
            Self::NetworkTimeout => "network-timeout",
            Self::PermissionDenied => "permission-denied",
            Self::ApiError => "api-error",
            Self::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// Record of a channel that did not survive subscription.
#[derive(Debug, Clone)]
pub struct SkippedChannel {
    pub channel_id: String,
    pub reason: SkipReason,
    pub detail: Option<String>,
}

/// Classify a channel-lookup failure into a skip reason, from the result
/// code first, then the HTTP status, then message heuristics.
pub fn skip_reason(err: &TransportError) -> SkipReason {
    if let Some(code) = err.code.as_deref() {
        match code {
            "channel_not_found" => return SkipReason::NotFound,
            "not_in_channel" => return SkipReason::NotAMember,
            "access_denied" | "restricted_action" => return SkipReason::AccessDenied,
            "ratelimited" | "rate_limited" => return SkipReason::RateLimited,
            "timeout" | "request_timeout" => return SkipReason::NetworkTimeout,
            "missing_scope" | "no_permission" | "ekm_access_denied" => {
                return SkipReason::PermissionDenied;
            },
            _ => return SkipReason::ApiError,
        }
    }

    match err.status {
        Some(429) => return SkipReason::RateLimited,
        Some(408) | Some(504) => return SkipReason::NetworkTimeout,
        Some(403) => return SkipReason::AccessDenied,
        _ => {},
    }

    let message = err.message.to_lowercase();
    if message.contains("timeout") || message.contains("timed out") {
        SkipReason::NetworkTimeout
    } else if message.contains("rate limit") {
        SkipReason::RateLimited
    } else if message.contains("not found") {
        SkipReason::NotFound
    } else if message.contains("permission") {
        SkipReason::PermissionDenied
    } else {
        SkipReason::Unknown
    }
}
