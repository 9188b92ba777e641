use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use crosstalk_common::{Message, MessageSink};

use crate::handler::MessageHandler;

/// Handler registry plus dispatch.
///
/// Registration and dispatch may interleave freely: dispatch snapshots the
/// enabled handlers under the lock, then runs them without holding it, so
/// registry mutation never races an in-flight batch.
#[derive(Default)]
pub struct MessagePipeline {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl MessagePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name, replacing any prior handler
    /// with that name.
    pub fn register(&self, handler: Arc<dyn MessageHandler>) {
        let name = handler.name().to_string();
        let replaced = self
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.clone(), handler)
            .is_some();
        info!(handler = %name, replaced, "message handler registered");
    }

    /// Remove a handler by name. Returns whether one was removed.
    pub fn unregister(&self, name: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some()
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// All registered handlers, in no particular order.
    pub fn handlers(&self) -> Vec<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// All registered handler names, sorted for stable output.
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn enabled_handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|h| h.enabled())
            .count()
    }

    pub fn clear(&self) {
        self.handlers.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Dispatch one message to every enabled handler concurrently and await
    /// them all. A failing handler is logged by name; the rest of the batch
    /// is unaffected.
    pub async fn process_message(&self, message: &Message) {
        let enabled: Vec<Arc<dyn MessageHandler>> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            handlers.values().filter(|h| h.enabled()).cloned().collect()
        };

        if enabled.is_empty() {
            debug!(team = %message.team, "no enabled handlers; message dropped");
            return;
        }

        let results = futures::future::join_all(enabled.iter().map(|handler| {
            let handler = Arc::clone(handler);
            async move {
                let result = handler.handle(message).await;
                (handler.name().to_string(), result)
            }
        }))
        .await;

        for (name, result) in results {
            if let Err(e) = result {
                warn!(handler = %name, error = %e, "message handler failed");
            }
        }
    }

    /// Dispatch a batch in chronological order: sort by wall time, then run
    /// `process_message` for each entry, awaiting each before the next.
    pub async fn process_messages(&self, messages: &[Message]) {
        for message in Self::sort_by_timestamp(messages) {
            self.process_message(&message).await;
        }
    }

    /// Return a new vector ordered by `wall_time` ascending. The input is
    /// untouched; ties keep their relative order.
    pub fn sort_by_timestamp(messages: &[Message]) -> Vec<Message> {
        let mut sorted = messages.to_vec();
        sorted.sort_by(|a, b| a.wall_time.total_cmp(&b.wall_time));
        sorted
    }
}

#[async_trait]
impl MessageSink for MessagePipeline {
    async fn accept(&self, message: Message) {
        self.process_message(&message).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {anyhow::Result, async_trait::async_trait};

    use super::*;

    /// Records every message it sees, tagged with its own name.
    struct RecordingHandler {
        handler_name: String,
        is_enabled: bool,
        seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        fn name(&self) -> &str {
            &self.handler_name
        }

        fn enabled(&self) -> bool {
            self.is_enabled
        }

        async fn handle(&self, message: &Message) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((self.handler_name.clone(), message.text.clone()));
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl MessageHandler for FailingHandler {
        fn name(&self) -> &str {
            "failer"
        }

        async fn handle(&self, _message: &Message) -> Result<()> {
            anyhow::bail!("always fails")
        }
    }

    fn recording(
        name: &str,
        enabled: bool,
        seen: &Arc<Mutex<Vec<(String, String)>>>,
    ) -> Arc<dyn MessageHandler> {
        Arc::new(RecordingHandler {
            handler_name: name.into(),
            is_enabled: enabled,
            seen: Arc::clone(seen),
        })
    }

    fn msg(text: &str, ts: &str) -> Message {
        Message::new("acme", "general", "C0000000001", "alice", text, ts)
    }

    #[test]
    fn registration_replaces_by_name() {
        let pipeline = MessagePipeline::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = recording("x", true, &seen);
        let second = recording("x", false, &seen);
        pipeline.register(first);
        pipeline.register(Arc::clone(&second));

        assert_eq!(pipeline.handler_count(), 1);
        let stored = pipeline.handler("x").unwrap();
        assert!(!stored.enabled(), "second registration must win");
    }

    #[test]
    fn unregister_and_clear() {
        let pipeline = MessagePipeline::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline.register(recording("a", true, &seen));
        pipeline.register(recording("b", false, &seen));

        assert_eq!(pipeline.handler_names(), vec!["a", "b"]);
        assert_eq!(pipeline.enabled_handler_count(), 1);
        assert!(pipeline.unregister("a"));
        assert!(!pipeline.unregister("a"));
        pipeline.clear();
        assert_eq!(pipeline.handler_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_skips_disabled_handlers() {
        let pipeline = MessagePipeline::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline.register(recording("a", true, &seen));
        pipeline.register(recording("b", false, &seen));
        pipeline.register(recording("c", true, &seen));

        pipeline.process_message(&msg("hello", "100")).await;

        let mut names: Vec<String> =
            seen.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_starve_others() {
        let pipeline = MessagePipeline::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline.register(recording("a", true, &seen));
        pipeline.register(Arc::new(FailingHandler));
        pipeline.register(recording("c", true, &seen));

        pipeline.process_message(&msg("hello", "100")).await;

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bulk_dispatch_is_chronological() {
        let pipeline = MessagePipeline::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline.register(recording("rec", true, &seen));

        let batch = vec![msg("hi", "100"), msg("lo", "99"), msg("yo", "101")];
        pipeline.process_messages(&batch).await;

        let texts: Vec<String> = seen.lock().unwrap().iter().map(|(_, t)| t.clone()).collect();
        assert_eq!(texts, vec!["lo", "hi", "yo"]);
        // Input order is untouched.
        assert_eq!(batch[0].text, "hi");
    }

    #[test]
    fn sort_returns_new_sequence() {
        let batch = vec![msg("b", "2"), msg("a", "1")];
        let sorted = MessagePipeline::sort_by_timestamp(&batch);
        assert_eq!(sorted[0].text, "a");
        assert_eq!(batch[0].text, "b");
        assert!(MessagePipeline::sort_by_timestamp(&[]).is_empty());
    }

    #[test]
    fn unparseable_timestamps_sort_first() {
        let batch = vec![msg("late", "50"), msg("odd", "garbage")];
        let sorted = MessagePipeline::sort_by_timestamp(&batch);
        assert_eq!(sorted[0].text, "odd");
    }

    #[tokio::test]
    async fn sink_feeds_dispatch() {
        let pipeline = MessagePipeline::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline.register(recording("rec", true, &seen));

        pipeline.accept(msg("via sink", "100")).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
