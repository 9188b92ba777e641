use {anyhow::Result, async_trait::async_trait};

use crosstalk_common::Message;

use crate::handler::MessageHandler;

pub const DEFAULT_SPEECH_COMMAND: &str = "say";

/// Text-to-speech placeholder. Carries the configured speech command so the
/// config surface is complete; invocation is not wired up yet.
pub struct SpeechHandler {
    is_enabled: bool,
    command: String,
}

impl SpeechHandler {
    pub fn new(enabled: bool, command: impl Into<String>) -> Self {
        Self {
            is_enabled: enabled,
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Default for SpeechHandler {
    fn default() -> Self {
        Self::new(false, DEFAULT_SPEECH_COMMAND)
    }
}

#[async_trait]
impl MessageHandler for SpeechHandler {
    fn name(&self) -> &str {
        "speech"
    }

    fn enabled(&self) -> bool {
        self.is_enabled
    }

    async fn handle(&self, _message: &Message) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disabled_with_say_command() {
        let handler = SpeechHandler::default();
        assert!(!handler.enabled());
        assert_eq!(handler.command(), "say");
        assert_eq!(handler.name(), "speech");
    }
}
