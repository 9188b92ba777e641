//! Keyword highlight matching.
//!
//! Keywords are written as `/pattern/flags` specs (the form operators already
//! know from their chat client's highlight settings). Specs are compiled once
//! at add time; matching a line against the full set is a short-circuiting
//! scan over precompiled patterns.

pub mod matcher;

pub use matcher::{HighlightMatcher, KeywordError};
