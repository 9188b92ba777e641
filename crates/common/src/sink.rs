use async_trait::async_trait;

use crate::types::Message;

/// Sink for demultiplexed messages — the pipeline provides the concrete
/// implementation; team clients only see this trait.
///
/// `accept` is infallible by contract: the sink owns its own fault isolation
/// and must never propagate handler failures back into the producing client.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn accept(&self, message: Message);
}
