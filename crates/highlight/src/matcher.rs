use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Accepted keyword spec shape: `/pattern/flags` with flags drawn from
/// `gimuy`. The pattern capture is greedy so embedded slashes stay in the
/// pattern and only the final `/flags` tail is split off.
static SPEC_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(.+)/([gimuy]*)$").unwrap_or_else(|e| unreachable!("spec shape regex: {e}"))
});

/// Why a keyword spec was rejected.
#[derive(Debug, thiserror::Error)]
pub enum KeywordError {
    /// The spec is not of the `/pattern/flags` form.
    #[error("keyword {spec:?} must be in /pattern/flags form")]
    BadShape { spec: String },

    /// The pattern between the slashes failed to compile.
    #[error("keyword {spec:?} compile failed: {source}")]
    Compile {
        spec: String,
        #[source]
        source: Box<regex::Error>,
    },
}

/// Precompiled set of highlight predicates.
///
/// Invariant: `sources` and `patterns` are parallel lists of equal length. A
/// successfully added spec appears in both; a rejected spec appears in
/// neither.
#[derive(Debug, Default)]
pub struct HighlightMatcher {
    sources: Vec<String>,
    patterns: Vec<Regex>,
}

impl HighlightMatcher {
    /// Build a matcher from an initial keyword list.
    ///
    /// Fails on the first invalid spec, leaving no partially-built matcher
    /// behind.
    pub fn new(keywords: &[String]) -> Result<Self, KeywordError> {
        let mut matcher = Self::default();
        for spec in keywords {
            matcher.add_keyword(spec)?;
        }
        Ok(matcher)
    }

    /// Compile `spec` and append it. On failure neither the source list nor
    /// the compiled list changes.
    pub fn add_keyword(&mut self, spec: &str) -> Result<(), KeywordError> {
        let pattern = compile_spec(spec)?;
        self.sources.push(spec.to_string());
        self.patterns.push(pattern);
        Ok(())
    }

    /// Remove one occurrence of `spec`. Returns whether anything was removed.
    pub fn remove_keyword(&mut self, spec: &str) -> bool {
        match self.sources.iter().position(|s| s == spec) {
            Some(idx) => {
                self.sources.remove(idx);
                self.patterns.remove(idx);
                true
            },
            None => false,
        }
    }

    /// The configured spec strings, as a defensive copy.
    pub fn keywords(&self) -> Vec<String> {
        self.sources.clone()
    }

    /// Whether any configured predicate matches `text`. Short-circuits on the
    /// first hit; an empty keyword set matches nothing.
    pub fn matches_any(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

/// Parse and compile a `/pattern/flags` spec.
///
/// `i` and `m` map onto the engine's case-insensitive and multi-line modes.
/// `g`, `u` and `y` are accepted for compatibility with the spec grammar but
/// are inert: existence matching is unaffected by global/sticky modes, and
/// patterns are Unicode-aware by default here.
fn compile_spec(spec: &str) -> Result<Regex, KeywordError> {
    let captures = SPEC_SHAPE.captures(spec).ok_or_else(|| KeywordError::BadShape {
        spec: spec.to_string(),
    })?;
    let pattern = &captures[1];
    let flags = &captures[2];

    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .build()
        .map_err(|source| KeywordError::Compile {
            spec: spec.to_string(),
            source: Box::new(source),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matches_case_insensitive_flag() {
        let matcher = HighlightMatcher::new(&specs(&["/php/i"])).unwrap();
        assert!(matcher.matches_any("some PHP code"));
        assert!(matcher.matches_any("Hello\nphp\nworld"));
        assert!(!matcher.matches_any("perl only"));
    }

    #[test]
    fn matches_respects_case_without_flag() {
        let matcher = HighlightMatcher::new(&specs(&["/php/"])).unwrap();
        assert!(matcher.matches_any("php"));
        assert!(!matcher.matches_any("PHP"));
    }

    #[test]
    fn multi_line_flag_anchors_per_line() {
        let matcher = HighlightMatcher::new(&specs(&["/^deploy/m"])).unwrap();
        assert!(matcher.matches_any("done\ndeploy now"));
        let plain = HighlightMatcher::new(&specs(&["/^deploy/"])).unwrap();
        assert!(!plain.matches_any("done\ndeploy now"));
    }

    #[test]
    fn embedded_slash_stays_in_pattern() {
        let matcher = HighlightMatcher::new(&specs(&["/a/b/i"])).unwrap();
        assert!(matcher.matches_any("A/B testing"));
    }

    #[test]
    fn bad_shape_rejected() {
        let mut matcher = HighlightMatcher::default();
        assert!(matches!(
            matcher.add_keyword("php"),
            Err(KeywordError::BadShape { .. })
        ));
        assert!(matches!(
            matcher.add_keyword("/php/x"),
            Err(KeywordError::BadShape { .. })
        ));
        assert!(matches!(
            matcher.add_keyword(""),
            Err(KeywordError::BadShape { .. })
        ));
    }

    #[test]
    fn add_is_atomic_on_compile_failure() {
        let mut matcher = HighlightMatcher::new(&specs(&["/ok/"])).unwrap();
        let err = matcher.add_keyword("/(unclosed/");
        assert!(matches!(err, Err(KeywordError::Compile { .. })));
        assert_eq!(matcher.keywords(), vec!["/ok/"]);
        assert_eq!(matcher.len(), 1);
    }

    #[test]
    fn constructor_rejects_whole_list_on_first_bad_spec() {
        let result = HighlightMatcher::new(&specs(&["/ok/", "bad", "/fine/"]));
        assert!(result.is_err());
    }

    #[test]
    fn remove_removes_one_occurrence() {
        let mut matcher = HighlightMatcher::new(&specs(&["/a/", "/b/", "/a/"])).unwrap();
        assert!(matcher.remove_keyword("/a/"));
        assert_eq!(matcher.keywords(), vec!["/b/", "/a/"]);
        assert!(!matcher.remove_keyword("/missing/"));
        assert!(matcher.matches_any("a"));
    }

    #[test]
    fn empty_set_matches_nothing() {
        let matcher = HighlightMatcher::default();
        assert!(!matcher.matches_any("anything"));
        assert!(matcher.is_empty());
    }

    #[test]
    fn inert_flags_accepted() {
        let matcher = HighlightMatcher::new(&specs(&["/ship/giuy"])).unwrap();
        assert!(matcher.matches_any("ship it"));
    }
}
