use std::{io::Write, sync::Arc};

use {anyhow::Result, async_trait::async_trait};

use {crosstalk_common::Message, crosstalk_highlight::HighlightMatcher};

use crate::handler::MessageHandler;

const RED_BOLD: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

/// Renders each message as one `{team}/{channel}/{user} > {text}` line on
/// stdout, with optional keyword highlighting.
pub struct ConsoleHandler {
    is_enabled: bool,
    highlight: Option<Arc<HighlightMatcher>>,
}

impl ConsoleHandler {
    pub fn new(enabled: bool) -> Self {
        Self {
            is_enabled: enabled,
            highlight: None,
        }
    }

    pub fn with_highlight(mut self, matcher: Arc<HighlightMatcher>) -> Self {
        self.highlight = Some(matcher);
        self
    }

    /// The plain (uncolored) rendering of a message.
    ///
    /// The body is sanitized, then collapsed onto one line. Highlight
    /// matching is NOT part of this — it runs against the original body so
    /// that multi-line patterns still fire after collapsing.
    pub fn render_line(message: &Message) -> String {
        let clean = collapse(&sanitize(&message.text));
        format!(
            "{}/{}/{} > {}",
            message.team, message.channel_name, message.user, clean
        )
    }

    fn render(&self, message: &Message) -> String {
        let line = Self::render_line(message);
        let highlighted = self
            .highlight
            .as_ref()
            .is_some_and(|m| m.matches_any(&message.text));
        if highlighted {
            format!("{RED_BOLD}{line}{RESET}")
        } else {
            line
        }
    }
}

#[async_trait]
impl MessageHandler for ConsoleHandler {
    fn name(&self) -> &str {
        "console"
    }

    fn enabled(&self) -> bool {
        self.is_enabled
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        let line = self.render(message);
        // One locked write per message keeps concurrent handler output
        // interleaving at line boundaries only.
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{line}")?;
        Ok(())
    }
}

/// Drop ASCII control bytes except `\t`, `\n` and `\r`.
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            !matches!(
                c,
                '\u{0000}'..='\u{0008}'
                    | '\u{000B}'
                    | '\u{000C}'
                    | '\u{000E}'..='\u{001F}'
                    | '\u{007F}'
            )
        })
        .collect()
}

/// Fold the body onto one line: `\r?\n` becomes a space, whitespace runs
/// collapse to a single space, ends are trimmed.
fn collapse(text: &str) -> String {
    let unbroken = text.replace("\r\n", " ").replace('\n', " ");
    let mut out = String::with_capacity(unbroken.len());
    let mut in_run = false;
    for ch in unbroken.chars() {
        if ch.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out.trim().to_string()
}
