use std::sync::{Arc, RwLock};

use {
    futures::{FutureExt, future::BoxFuture},
    tracing::{debug, error, info, instrument},
};

use crate::{
    error::{Error, Result},
    gating::is_authorized,
    handler::{CommandHandler, FileHandler, HandlerResult, TextHandler},
    materialize::Materializer,
    mime::{self, Attachment},
    plugin::{ChannelOutbound, EventKind, InboundEvent},
    registry::{Chain, FileKey, HandlerRegistry},
};

/// Reply sent when processing an event failed anywhere past the guard.
pub const INTERNAL_ERROR_REPLY: &str = "Internal error while processing the message.";

/// Routes inbound events through the registered handler chains.
///
/// One dispatcher serves one channel session. It is shared across the tasks
/// processing concurrent events; the only mutable state is the authorized
/// identity and the registry, both of which are read as snapshots.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    outbound: Arc<dyn ChannelOutbound>,
    materializer: Arc<Materializer>,
    authorized: RwLock<String>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        outbound: Arc<dyn ChannelOutbound>,
        materializer: Arc<Materializer>,
        authorized_chat: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            outbound,
            materializer,
            authorized: RwLock::new(authorized_chat.into()),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Currently authorized conversation, empty when unconfigured.
    pub fn authorized_chat(&self) -> String {
        self.authorized
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the authorized conversation. Applies from the next event on.
    pub fn set_authorized_chat(&self, chat_id: impl Into<String>) {
        let chat_id = chat_id.into();
        info!(chat_id, "authorized chat updated");
        *self.authorized.write().unwrap_or_else(|e| e.into_inner()) = chat_id;
    }

    /// Send an unlabelled message to the authorized conversation.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let chat_id = self.authorized_chat();
        if chat_id.trim().is_empty() {
            return Err(Error::unavailable("no authorized chat configured"));
        }
        self.outbound.send_text(chat_id.trim(), text).await
    }

    /// Process one inbound event end to end.
    ///
    /// Never fails: errors are logged and answered with
    /// [`INTERNAL_ERROR_REPLY`], leaving the dispatcher ready for the next
    /// event.
    #[instrument(skip_all, fields(chat_id = %event.chat_id, kind = event.kind.label()))]
    pub async fn handle(&self, event: InboundEvent) {
        if !is_authorized(&event.chat_id, &self.authorized_chat()) {
            debug!("dropping event from unauthorized chat");
            return;
        }

        let chat_id = event.chat_id.as_str();
        let outcome = match &event.kind {
            EventKind::Command { name } => self.dispatch_command(chat_id, name).await,
            EventKind::Text { text } => self.dispatch_text(chat_id, text).await,
            EventKind::File {
                attachment,
                caption,
            } => {
                self.dispatch_file(chat_id, attachment.as_ref(), caption.as_deref())
                    .await
            },
        };

        match outcome {
            Ok(Some(processed)) => debug!(processed, "event dispatched"),
            Ok(None) => {},
            Err(e) => {
                error!(error = %e, "failed to process event");
                if let Err(e) = self.outbound.send_text(chat_id, INTERNAL_ERROR_REPLY).await {
                    error!(error = %e, "failed to send error reply");
                }
            },
        }
    }

    /// Run the chain for `/<name>`.
    ///
    /// Returns the chain's final processed flag, or `None` when no handler is
    /// registered for the command.
    pub async fn dispatch_command(&self, chat_id: &str, name: &str) -> Result<Option<bool>> {
        let Some(chain) = self.registry.command_chain(name) else {
            debug!(command = name, "no handlers registered for command");
            return Ok(None);
        };
        let processed = self
            .run_chain(
                chat_id,
                chain,
                false,
                |handler: Arc<dyn CommandHandler>, before| {
                    async move { handler.handle(before).await }.boxed()
                },
            )
            .await?;
        Ok(Some(processed))
    }

    /// Run the text chain.
    pub async fn dispatch_text(&self, chat_id: &str, text: &str) -> Result<Option<bool>> {
        let Some(chain) = self.registry.text_chain() else {
            debug!("no text handlers registered");
            return Ok(None);
        };
        let processed = self
            .run_chain(
                chat_id,
                chain,
                false,
                |handler: Arc<dyn TextHandler>, before| {
                    async move { handler.handle(text, before).await }.boxed()
                },
            )
            .await?;
        Ok(Some(processed))
    }

    /// Classify, materialize and run the specific then wildcard file chains.
    ///
    /// The specific chain's final flag seeds the wildcard chain. Nothing is
    /// downloaded when the attachment is unclassifiable or nobody listens.
    pub async fn dispatch_file(
        &self,
        chat_id: &str,
        attachment: Option<&Attachment>,
        caption: Option<&str>,
    ) -> Result<Option<bool>> {
        let classified = attachment.and_then(|a| Some((a, mime::classify(Some(a))?)));
        let Some((attachment, mime)) = classified else {
            info!(
                payload = attachment.map(Attachment::kind),
                "dropping unclassifiable attachment"
            );
            return Ok(None);
        };

        let specific = self.registry.file_chain(&FileKey::Mime(mime.to_string()));
        let wildcard = self.registry.file_chain(&FileKey::Any);
        if specific.is_none() && wildcard.is_none() {
            debug!(mime, "no file handlers registered for mime type");
            return Ok(None);
        }

        let file = self.materializer.materialize(attachment.file_id()).await?;
        let file = &file;

        let mut processed = false;
        for chain in [specific, wildcard].into_iter().flatten() {
            processed = self
                .run_chain(
                    chat_id,
                    chain,
                    processed,
                    |handler: Arc<dyn FileHandler>, before| {
                        async move { handler.handle(file, before, caption).await }.boxed()
                    },
                )
                .await?;
        }
        Ok(Some(processed))
    }

    /// Left fold over `chain`: each handler sees the OR of every earlier
    /// `processed` flag, starting from `processed_before`. Each answer is sent
    /// as its own reply as soon as the handler returns; the first error aborts
    /// the rest of the chain.
    async fn run_chain<'a, H: ?Sized>(
        &self,
        chat_id: &str,
        chain: Chain<H>,
        mut processed_before: bool,
        invoke: impl Fn(Arc<H>, bool) -> BoxFuture<'a, anyhow::Result<HandlerResult>>,
    ) -> Result<bool> {
        for entry in chain {
            let result = invoke(Arc::clone(&entry.handler), processed_before)
                .await
                .map_err(|e| Error::handler(&entry.owner, e))?;
            if let Some(answer) = result.answer.as_deref() {
                self.outbound
                    .send_reply(chat_id, &entry.owner, answer)
                    .await?;
            }
            processed_before |= result.processed;
        }
        Ok(processed_before)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use {
        super::*,
        crate::{
            materialize::{FileTransport, RemoteFile},
            store::{FileHandle, FileIndex, LocalFileIndex},
        },
        async_trait::async_trait,
    };

    const CHAT: &str = "4242";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Text { to: String, text: String },
        Reply {
            to: String,
            owner: String,
            answer: String,
        },
    }

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingOutbound {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelOutbound for RecordingOutbound {
        async fn send_text(&self, to: &str, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Text {
                to: to.into(),
                text: text.into(),
            });
            Ok(())
        }

        async fn send_reply(&self, to: &str, owner: &str, answer: &str) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Reply {
                to: to.into(),
                owner: owner.into(),
                answer: answer.into(),
            });
            Ok(())
        }
    }

    /// One observed handler invocation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Call {
        name: &'static str,
        processed_before: bool,
        input: Option<String>,
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    /// Records its invocations and returns a canned result.
    struct Probe {
        name: &'static str,
        log: Log,
        result: Option<HandlerResult>,
    }

    impl Probe {
        fn new(name: &'static str, log: &Log, result: HandlerResult) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
                result: Some(result),
            })
        }

        fn failing(name: &'static str, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
                result: None,
            })
        }

        fn record(&self, processed_before: bool, input: Option<String>) -> anyhow::Result<HandlerResult> {
            self.log.lock().unwrap().push(Call {
                name: self.name,
                processed_before,
                input,
            });
            self.result
                .clone()
                .ok_or_else(|| anyhow::anyhow!("{} exploded", self.name))
        }
    }

    #[async_trait]
    impl CommandHandler for Probe {
        async fn handle(&self, processed_before: bool) -> anyhow::Result<HandlerResult> {
            self.record(processed_before, None)
        }
    }

    #[async_trait]
    impl TextHandler for Probe {
        async fn handle(&self, text: &str, processed_before: bool) -> anyhow::Result<HandlerResult> {
            self.record(processed_before, Some(text.to_string()))
        }
    }

    #[async_trait]
    impl FileHandler for Probe {
        async fn handle(
            &self,
            file: &FileHandle,
            processed_before: bool,
            caption: Option<&str>,
        ) -> anyhow::Result<HandlerResult> {
            let input = match caption {
                Some(caption) => format!("{}|{caption}", file.path),
                None => file.path.clone(),
            };
            self.record(processed_before, Some(input))
        }
    }

    /// Writes the file id into the reserved destination.
    #[derive(Default)]
    struct StubTransport {
        resolves: AtomicUsize,
    }

    #[async_trait]
    impl FileTransport for StubTransport {
        async fn resolve(&self, file_id: &str) -> Result<RemoteFile> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteFile {
                id: file_id.into(),
                path: format!("documents/{file_id}.bin"),
            })
        }

        async fn download(&self, remote: &RemoteFile, destination: &Path) -> Result<PathBuf> {
            tokio::fs::write(destination, remote.id.as_bytes()).await?;
            Ok(destination.to_path_buf())
        }
    }

    struct EmptyIndex;

    #[async_trait]
    impl FileIndex for EmptyIndex {
        async fn resolve(&self, _path: &str) -> Option<FileHandle> {
            None
        }
    }

    struct Harness {
        _vault: tempfile::TempDir,
        dispatcher: Dispatcher,
        outbound: Arc<RecordingOutbound>,
        transport: Arc<StubTransport>,
        log: Log,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_index(None)
        }

        fn with_index(index: Option<Arc<dyn FileIndex>>) -> Self {
            let vault = tempfile::tempdir().unwrap();
            let outbound = Arc::new(RecordingOutbound::default());
            let transport = Arc::new(StubTransport::default());
            let index = index.unwrap_or_else(|| Arc::new(LocalFileIndex::new(vault.path())));
            let materializer = Arc::new(Materializer::new(
                vault.path(),
                "Telegram",
                Arc::clone(&transport) as Arc<dyn FileTransport>,
                index,
            ));
            let dispatcher = Dispatcher::new(
                Arc::new(HandlerRegistry::new()),
                Arc::clone(&outbound) as Arc<dyn ChannelOutbound>,
                materializer,
                CHAT,
            );
            Self {
                _vault: vault,
                dispatcher,
                outbound,
                transport,
                log: Log::default(),
            }
        }

        fn registry(&self) -> &HandlerRegistry {
            self.dispatcher.registry()
        }

        fn calls(&self) -> Vec<Call> {
            self.log.lock().unwrap().clone()
        }

        fn flags(&self) -> Vec<(&'static str, bool)> {
            self.calls()
                .into_iter()
                .map(|c| (c.name, c.processed_before))
                .collect()
        }

        async fn send(&self, chat_id: &str, kind: EventKind) {
            self.dispatcher
                .handle(InboundEvent {
                    chat_id: chat_id.into(),
                    kind,
                })
                .await;
        }
    }

    fn command(name: &str) -> EventKind {
        EventKind::Command { name: name.into() }
    }

    fn text(text: &str) -> EventKind {
        EventKind::Text { text: text.into() }
    }

    fn document(file_id: &str, mime: Option<&str>, caption: Option<&str>) -> EventKind {
        EventKind::File {
            attachment: Some(Attachment::Document {
                file_id: file_id.into(),
                mime_type: mime.map(str::to_string),
            }),
            caption: caption.map(str::to_string),
        }
    }

    fn reply(owner: &str, answer: &str) -> Sent {
        Sent::Reply {
            to: CHAT.into(),
            owner: owner.into(),
            answer: answer.into(),
        }
    }

    fn error_reply() -> Sent {
        Sent::Text {
            to: CHAT.into(),
            text: INTERNAL_ERROR_REPLY.into(),
        }
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order() {
        let h = Harness::new();
        for name in ["a", "b", "c"] {
            h.registry()
                .add_command_handler("sync", Probe::new(name, &h.log, HandlerResult::skipped()), name);
        }

        h.send(CHAT, command("sync")).await;

        let names: Vec<_> = h.calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(h.outbound.sent().is_empty());
    }

    #[tokio::test]
    async fn processed_before_never_resets_within_a_chain() {
        let h = Harness::new();
        let results = [
            ("a", HandlerResult::skipped()),
            ("b", HandlerResult::processed()),
            ("c", HandlerResult::skipped()),
            ("d", HandlerResult::informational("fyi")),
        ];
        for (name, result) in results {
            h.registry().add_text_handler(Probe::new(name, &h.log, result), name);
        }

        h.send(CHAT, text("buy milk")).await;

        assert_eq!(h.flags(), [("a", false), ("b", false), ("c", true), ("d", true)]);
        assert!(
            h.calls()
                .iter()
                .all(|c| c.input.as_deref() == Some("buy milk"))
        );
    }

    #[tokio::test]
    async fn every_answer_is_its_own_labelled_reply() {
        let h = Harness::new();
        h.registry()
            .add_command_handler("status", Probe::new("a", &h.log, HandlerResult::answered("one")), "tasks");
        h.registry().add_command_handler(
            "status",
            Probe::new("b", &h.log, HandlerResult::informational("two")),
            "journal",
        );
        h.registry()
            .add_command_handler("status", Probe::new("c", &h.log, HandlerResult::processed()), "sync");

        h.send(CHAT, command("status")).await;

        assert_eq!(h.outbound.sent(), [reply("tasks", "one"), reply("journal", "two")]);
    }

    #[tokio::test]
    async fn wildcard_chain_starts_from_specific_chain_flag() {
        let h = Harness::new();
        h.registry().add_file_handler(
            Probe::new("pdf", &h.log, HandlerResult::processed()),
            "reader",
            Some("application/pdf"),
        );
        h.registry()
            .add_file_handler(Probe::new("any", &h.log, HandlerResult::skipped()), "inbox", None);

        h.send(CHAT, document("f1", Some("application/pdf"), Some("report"))).await;

        assert_eq!(h.flags(), [("pdf", false), ("any", true)]);
        let input = h.calls()[1].input.clone().unwrap();
        assert!(input.starts_with("Telegram/"), "{input}");
        assert!(input.ends_with("-documents-f1.bin|report"), "{input}");
    }

    #[tokio::test]
    async fn wildcard_alone_starts_unprocessed() {
        let h = Harness::new();
        h.registry().add_file_handler(
            Probe::new("png", &h.log, HandlerResult::processed()),
            "images",
            Some("image/png"),
        );
        h.registry()
            .add_file_handler(Probe::new("any", &h.log, HandlerResult::skipped()), "inbox", None);

        h.send(CHAT, document("f1", Some("application/pdf"), None)).await;

        assert_eq!(h.flags(), [("any", false)]);
    }

    #[tokio::test]
    async fn specific_chain_alone_runs() {
        let h = Harness::new();
        h.registry().add_file_handler(
            Probe::new("pdf", &h.log, HandlerResult::answered("saved")),
            "reader",
            Some("application/pdf"),
        );

        h.send(CHAT, document("f1", Some("application/pdf"), None)).await;

        assert_eq!(h.flags(), [("pdf", false)]);
        assert_eq!(h.outbound.sent(), [reply("reader", "saved")]);
    }

    #[tokio::test]
    async fn photo_is_routed_as_jpeg() {
        let h = Harness::new();
        h.registry().add_file_handler(
            Probe::new("jpeg", &h.log, HandlerResult::processed()),
            "images",
            Some("image/jpeg"),
        );

        h.send(CHAT, EventKind::File {
            attachment: Some(Attachment::Photo {
                file_id: "p1".into(),
            }),
            caption: None,
        })
        .await;

        assert_eq!(h.flags(), [("jpeg", false)]);
    }

    #[tokio::test]
    async fn unauthorized_chat_reaches_no_handler() {
        let h = Harness::new();
        h.registry()
            .add_command_handler("sync", Probe::new("cmd", &h.log, HandlerResult::answered("x")), "a");
        h.registry()
            .add_text_handler(Probe::new("text", &h.log, HandlerResult::answered("x")), "a");
        h.registry()
            .add_file_handler(Probe::new("file", &h.log, HandlerResult::answered("x")), "a", None);

        for kind in [
            command("sync"),
            text("hi"),
            document("f1", Some("text/plain"), None),
        ] {
            h.send("999", kind).await;
        }

        assert!(h.calls().is_empty());
        assert!(h.outbound.sent().is_empty());
        assert_eq!(h.transport.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unconfigured_chat_accepts_nothing() {
        let h = Harness::new();
        h.dispatcher.set_authorized_chat("");
        h.registry()
            .add_text_handler(Probe::new("text", &h.log, HandlerResult::answered("x")), "a");

        h.send(CHAT, text("hi")).await;
        h.send("", text("hi")).await;

        assert!(h.calls().is_empty());
        assert!(h.outbound.sent().is_empty());
    }

    #[tokio::test]
    async fn authorized_chat_can_change_at_runtime() {
        let h = Harness::new();
        h.registry()
            .add_text_handler(Probe::new("text", &h.log, HandlerResult::skipped()), "a");

        h.dispatcher.set_authorized_chat("777");
        h.send(CHAT, text("old")).await;
        h.send("777", text("new")).await;

        assert_eq!(h.dispatcher.authorized_chat(), "777");
        let inputs: Vec<_> = h.calls().into_iter().filter_map(|c| c.input).collect();
        assert_eq!(inputs, ["new"]);
    }

    #[tokio::test]
    async fn unclassifiable_attachment_is_dropped_before_download() {
        let h = Harness::new();
        h.registry()
            .add_file_handler(Probe::new("any", &h.log, HandlerResult::answered("x")), "a", None);

        h.send(CHAT, document("f1", None, None)).await;
        h.send(CHAT, EventKind::File {
            attachment: None,
            caption: Some("sticker".into()),
        })
        .await;

        assert!(h.calls().is_empty());
        assert!(h.outbound.sent().is_empty());
        assert_eq!(h.transport.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_listener_means_no_download() {
        let h = Harness::new();
        h.registry().add_file_handler(
            Probe::new("png", &h.log, HandlerResult::processed()),
            "images",
            Some("image/png"),
        );

        h.send(CHAT, document("f1", Some("application/pdf"), None)).await;

        assert!(h.calls().is_empty());
        assert_eq!(h.transport.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_handlers_are_silent() {
        let h = Harness::new();

        assert_eq!(h.dispatcher.dispatch_command(CHAT, "nope").await.unwrap(), None);
        assert_eq!(h.dispatcher.dispatch_text(CHAT, "hello").await.unwrap(), None);
        h.send(CHAT, command("nope")).await;
        h.send(CHAT, text("hello")).await;

        assert!(h.outbound.sent().is_empty());
    }

    #[tokio::test]
    async fn handler_error_aborts_chain_with_one_error_reply() {
        let h = Harness::new();
        h.registry()
            .add_command_handler("sync", Probe::new("a", &h.log, HandlerResult::answered("first")), "a");
        h.registry().add_command_handler("sync", Probe::failing("b", &h.log), "b");
        h.registry()
            .add_command_handler("sync", Probe::new("c", &h.log, HandlerResult::answered("late")), "c");
        h.registry()
            .add_text_handler(Probe::new("text", &h.log, HandlerResult::answered("ok")), "inbox");

        h.send(CHAT, command("sync")).await;

        let names: Vec<_> = h.calls().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(h.outbound.sent(), [reply("a", "first"), error_reply()]);

        h.send(CHAT, text("still alive")).await;
        assert_eq!(h.outbound.sent().last(), Some(&reply("inbox", "ok")));
    }

    #[tokio::test]
    async fn handler_error_is_labelled_with_owner() {
        let h = Harness::new();
        h.registry()
            .add_text_handler(Probe::failing("boom", &h.log), "journal");

        let err = h.dispatcher.dispatch_text(CHAT, "x").await.unwrap_err();
        assert!(matches!(err, Error::Handler { ref owner, .. } if owner == "journal"));
    }

    #[tokio::test]
    async fn lookup_failure_gets_generic_reply() {
        let h = Harness::with_index(Some(Arc::new(EmptyIndex)));
        h.registry()
            .add_file_handler(Probe::new("any", &h.log, HandlerResult::answered("x")), "a", None);

        h.send(CHAT, document("f1", Some("text/plain"), None)).await;

        assert!(h.calls().is_empty());
        assert_eq!(h.outbound.sent(), [error_reply()]);
    }

    #[tokio::test]
    async fn concurrent_files_get_distinct_handles() {
        let h = Harness::new();
        h.registry()
            .add_file_handler(Probe::new("any", &h.log, HandlerResult::processed()), "a", None);

        tokio::join!(
            h.send(CHAT, document("first", Some("text/plain"), None)),
            h.send(CHAT, document("second", Some("text/plain"), None)),
        );

        let mut paths: Vec<String> = h.calls().into_iter().filter_map(|c| c.input).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 2);
        assert!(h.outbound.sent().is_empty());
    }

    #[tokio::test]
    async fn send_message_requires_configured_chat() {
        let h = Harness::new();
        h.dispatcher.send_message("hello").await.unwrap();
        assert_eq!(h.outbound.sent(), [Sent::Text {
            to: CHAT.into(),
            text: "hello".into()
        }]);

        h.dispatcher.set_authorized_chat("  ");
        let err = h.dispatcher.send_message("hello").await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
    }
}
