use {anyhow::Result, async_trait::async_trait};

use crosstalk_common::Message;

use crate::handler::MessageHandler;

/// Desktop-notification placeholder. Registered so multi-handler dispatch is
/// exercised end to end; delivery itself is not wired up yet.
pub struct NotificationHandler {
    is_enabled: bool,
}

impl NotificationHandler {
    pub fn new(enabled: bool) -> Self {
        Self {
            is_enabled: enabled,
        }
    }
}

impl Default for NotificationHandler {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl MessageHandler for NotificationHandler {
    fn name(&self) -> &str {
        "notification"
    }

    fn enabled(&self) -> bool {
        self.is_enabled
    }

    async fn handle(&self, _message: &Message) -> Result<()> {
        Ok(())
    }
}
