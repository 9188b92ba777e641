use {anyhow::Result, async_trait::async_trait};

use crosstalk_common::Message;

/// Capability contract every message sink satisfies.
///
/// The registry keys handlers by [`name`](MessageHandler::name); registering
/// a second handler under the same name replaces the first. Disabled handlers
/// stay registered but are skipped at dispatch time.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Registry key, e.g. "console".
    fn name(&self) -> &str;

    /// Whether dispatch should currently include this handler.
    fn enabled(&self) -> bool {
        true
    }

    /// Consume one message. Failures are logged by the pipeline and never
    /// abort the batch or reach other handlers.
    async fn handle(&self, message: &Message) -> Result<()>;
}
