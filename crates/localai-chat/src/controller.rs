//! Chat session controller.
//!
//! One controller drives at most one turn at a time:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Completed
//!            |           |
//!            +-----------+--> Aborted (cancel) | Failed (transport/decode)
//! ```
//!
//! Terminal states accept the next submission. Only a completed turn
//! touches the transcript, and it commits the user and assistant messages
//! together. Its usage reaches the session total after that commit.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use localai_core::budget::{
    ContextLevel, ContextWindow, SessionTokens, TokenUsage, UsageAccumulator, DEFAULT_CONTEXT_LIMIT,
};
use localai_core::config::{Config, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use localai_core::persona::{Persona, DEFAULT_PERSONA};
use localai_core::{ChatMessage, ChatRequest, SettingsStore, TranscriptStore};
use localai_llm::{decode_stream, ChatTransport};

use crate::error::ChatError;
use crate::stream::{consume_event_stream, StreamOutcome};

pub type ChunkSink = Arc<dyn Fn(&str) + Send + Sync>;
pub type UsageSink = Arc<dyn Fn(&TokenUsage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Aborted,
    Failed,
}

impl TurnState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TurnState::Sending | TurnState::Streaming)
    }
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed {
        message: ChatMessage,
        usage: TokenUsage,
    },
    Aborted,
}

/// Request defaults. Stored settings (`selected_model`, `api_key`) win over
/// `model` and `api_key` here.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub model: String,
    pub api_key: Option<String>,
    pub persona: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub context_limit: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            persona: Some(DEFAULT_PERSONA.to_string()),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            context_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }
}

impl From<&Config> for ChatOptions {
    fn from(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            persona: config.persona.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            context_limit: config.context_limit,
        }
    }
}

struct TurnSlot {
    state: TurnState,
    cancel_token: Option<CancellationToken>,
    /// Set while `clear` empties the transcript; no turn may start.
    clearing: bool,
}

impl TurnSlot {
    fn is_busy(&self) -> bool {
        self.state.is_in_flight() || self.clearing
    }
}

struct ControllerInner {
    transport: Arc<dyn ChatTransport>,
    settings: Arc<dyn SettingsStore>,
    transcript: Arc<dyn TranscriptStore>,
    session: SessionTokens,
    options: ChatOptions,
    slot: Mutex<TurnSlot>,
    chunk_sink: RwLock<Option<ChunkSink>>,
    usage_sink: RwLock<Option<UsageSink>>,
}

/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<ControllerInner>,
}

impl ChatController {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        settings: Arc<dyn SettingsStore>,
        transcript: Arc<dyn TranscriptStore>,
        session: SessionTokens,
        options: ChatOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                transport,
                settings,
                transcript,
                session,
                options,
                slot: Mutex::new(TurnSlot {
                    state: TurnState::Idle,
                    cancel_token: None,
                    clearing: false,
                }),
                chunk_sink: RwLock::new(None),
                usage_sink: RwLock::new(None),
            }),
        }
    }

    /// Receive each text delta as it arrives.
    pub fn on_chunk<F>(&self, sink: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *write(&self.inner.chunk_sink) = Some(Arc::new(sink));
    }

    /// Receive the usage of each completed turn.
    pub fn on_usage<F>(&self, sink: F)
    where
        F: Fn(&TokenUsage) + Send + Sync + 'static,
    {
        *write(&self.inner.usage_sink) = Some(Arc::new(sink));
    }

    pub fn state(&self) -> TurnState {
        lock(&self.inner.slot).state
    }

    pub fn session_tokens(&self) -> &SessionTokens {
        &self.inner.session
    }

    pub fn context_window(&self) -> ContextWindow {
        ContextWindow::new(self.inner.options.context_limit)
    }

    pub fn context_level(&self) -> ContextLevel {
        self.inner.session.context_level(&self.context_window())
    }

    pub async fn messages(&self) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self.inner.transcript.messages().await?)
    }

    /// Start a turn in the background. Deltas and usage go to the sinks.
    ///
    /// The turn is registered before this returns, so a following
    /// [`ChatController::cancel`] always reaches it.
    pub fn submit(&self, prompt: impl Into<String>) -> JoinHandle<Result<TurnOutcome, ChatError>> {
        let prompt = prompt.into();
        let begun = self.begin_turn(&prompt);
        let controller = self.clone();

        tokio::spawn(async move {
            let cancel_token = match begun {
                Ok(token) => token,
                Err(e) => return Err(e),
            };
            let result = controller.drive_turn(prompt, cancel_token).await;
            if let Err(e) = &result {
                log::warn!("Chat turn failed: {}", e);
            }
            result
        })
    }

    /// Run one turn to completion.
    pub async fn send(&self, prompt: impl Into<String>) -> Result<TurnOutcome, ChatError> {
        let prompt = prompt.into();
        let cancel_token = self.begin_turn(&prompt)?;
        self.drive_turn(prompt, cancel_token).await
    }

    /// Cancel the in-flight turn, if any. The turn ends as
    /// [`TurnOutcome::Aborted`] at its next suspension point.
    pub fn cancel(&self) {
        let slot = lock(&self.inner.slot);
        if let Some(token) = &slot.cancel_token {
            log::debug!("Cancelling in-flight turn ({:?})", slot.state);
            token.cancel();
        }
    }

    /// Start a new chat: empty the transcript and reset the session total.
    ///
    /// Submissions are refused with [`ChatError::Busy`] until it returns.
    pub async fn clear(&self) -> Result<(), ChatError> {
        {
            let mut slot = lock(&self.inner.slot);
            if slot.is_busy() {
                return Err(ChatError::Busy);
            }
            slot.clearing = true;
        }

        let result = self.inner.transcript.clear().await;

        let mut slot = lock(&self.inner.slot);
        slot.clearing = false;
        result?;
        self.inner.session.reset();
        slot.state = TurnState::Idle;
        log::info!("Chat cleared");
        Ok(())
    }

    fn begin_turn(&self, prompt: &str) -> Result<CancellationToken, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::EmptyPrompt);
        }

        let mut slot = lock(&self.inner.slot);
        if slot.is_busy() {
            return Err(ChatError::Busy);
        }

        let token = CancellationToken::new();
        slot.state = TurnState::Sending;
        slot.cancel_token = Some(token.clone());
        Ok(token)
    }

    fn set_state(&self, state: TurnState) {
        lock(&self.inner.slot).state = state;
    }

    fn finish_turn(&self, result: &Result<TurnOutcome, ChatError>) {
        let mut slot = lock(&self.inner.slot);
        slot.state = match result {
            Ok(TurnOutcome::Completed { .. }) => TurnState::Completed,
            Ok(TurnOutcome::Aborted) => TurnState::Aborted,
            Err(_) => TurnState::Failed,
        };
        slot.cancel_token = None;
    }

    async fn drive_turn(
        &self,
        prompt: String,
        cancel_token: CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let result = self.run_turn(&request_id, prompt, &cancel_token).await;
        self.finish_turn(&result);

        match &result {
            Ok(TurnOutcome::Completed { usage, .. }) => log::info!(
                "[{}] Turn completed: {} tokens, session {}",
                request_id,
                usage.total_tokens,
                self.inner.session.total()
            ),
            Ok(TurnOutcome::Aborted) => log::info!("[{}] Turn aborted", request_id),
            Err(e) => log::debug!("[{}] Turn failed: {}", request_id, e),
        }

        result
    }

    async fn run_turn(
        &self,
        request_id: &str,
        prompt: String,
        cancel_token: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        let inner = &self.inner;
        let history = inner.transcript.messages().await?;

        let mut turn_messages = Vec::with_capacity(3);
        if history.is_empty() {
            if let Some(persona_id) = &inner.options.persona {
                turn_messages.push(Persona::resolve(persona_id).system_message());
            }
        }
        turn_messages.push(ChatMessage::user(prompt));

        let model = inner
            .settings
            .selected_model()
            .await?
            .unwrap_or_else(|| inner.options.model.clone());
        let api_key = inner
            .settings
            .api_key()
            .await?
            .or_else(|| inner.options.api_key.clone());

        let mut prompt_messages = history;
        prompt_messages.extend(turn_messages.iter().cloned());

        let request = ChatRequest::new(model, prompt_messages)
            .with_temperature(inner.options.temperature)
            .with_max_tokens(inner.options.max_tokens)
            .with_persona(inner.options.persona.clone());

        log::debug!(
            "[{}] Sending {} messages to model {}",
            request_id,
            request.messages.len(),
            request.model
        );

        let body = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log::debug!("[{}] Cancelled before the response arrived", request_id);
                return Ok(TurnOutcome::Aborted);
            }
            body = inner.transport.open_stream(&request, api_key.as_deref()) => body?,
        };

        self.set_state(TurnState::Streaming);

        let chunk_sink = read(&inner.chunk_sink).clone();
        let outcome = consume_event_stream(
            decode_stream(body),
            UsageAccumulator::new(inner.session.clone()),
            chunk_sink.as_deref(),
            cancel_token,
            request_id,
        )
        .await?;

        let output = match outcome {
            StreamOutcome::Completed(output) => output,
            StreamOutcome::Cancelled => return Ok(TurnOutcome::Aborted),
        };

        let mut assistant = ChatMessage::assistant(output.content, output.tool_calls);
        assistant.tokens = Some(output.accumulator.completion_tokens());
        turn_messages.push(assistant.clone());
        inner.transcript.append(&turn_messages).await?;

        let usage = output.accumulator.finalize(&request.messages);

        let usage_sink = read(&inner.usage_sink).clone();
        if let Some(sink) = usage_sink {
            sink(&usage);
        }

        Ok(TurnOutcome::Completed {
            message: assistant,
            usage,
        })
    }
}

// Poisoning only means a sink panicked; the guarded data stays consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use localai_core::{MemoryStore, Role, StoreError};
    use localai_llm::{ByteStream, LLMError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{mpsc, Notify};

    fn record(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    /// Replays canned bodies and records the requests it saw.
    #[derive(Default)]
    struct ScriptedTransport {
        bodies: Mutex<Vec<Vec<String>>>,
        requests: Mutex<Vec<(ChatRequest, Option<String>)>>,
        fail_with_status: Option<u16>,
    }

    impl ScriptedTransport {
        fn replying(bodies: Vec<Vec<String>>) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(bodies),
                ..Default::default()
            })
        }

        fn requests(&self) -> Vec<(ChatRequest, Option<String>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open_stream(
            &self,
            request: &ChatRequest,
            api_key: Option<&str>,
        ) -> localai_llm::Result<ByteStream> {
            self.requests
                .lock()
                .unwrap()
                .push((request.clone(), api_key.map(str::to_string)));

            if let Some(status) = self.fail_with_status {
                return Err(LLMError::Api {
                    status,
                    body: "unavailable".to_string(),
                });
            }

            let chunks = self.bodies.lock().unwrap().remove(0);
            let items: Vec<localai_llm::Result<Bytes>> =
                chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    /// Emits one delta, then waits for more bytes that never come.
    struct StallingTransport {
        opened: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl ChatTransport for StallingTransport {
        async fn open_stream(
            &self,
            _request: &ChatRequest,
            _api_key: Option<&str>,
        ) -> localai_llm::Result<ByteStream> {
            let _ = self.opened.send(());
            let first = stream::iter(vec![Ok(Bytes::from(record("partial")))]);
            Ok(Box::pin(first.chain(stream::pending())))
        }
    }

    /// Never answers; the request stays in `Sending`.
    struct UnansweredTransport {
        opened: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl ChatTransport for UnansweredTransport {
        async fn open_stream(
            &self,
            _request: &ChatRequest,
            _api_key: Option<&str>,
        ) -> localai_llm::Result<ByteStream> {
            let _ = self.opened.send(());
            futures::future::pending().await
        }
    }

    /// Emits one delta, then the connection drops.
    struct ResetTransport;

    #[async_trait]
    impl ChatTransport for ResetTransport {
        async fn open_stream(
            &self,
            _request: &ChatRequest,
            _api_key: Option<&str>,
        ) -> localai_llm::Result<ByteStream> {
            let items: Vec<localai_llm::Result<Bytes>> = vec![
                Ok(Bytes::from(record("partial"))),
                Err(LLMError::Stream("connection reset".to_string())),
            ];
            Ok(Box::pin(stream::iter(items)))
        }
    }

    /// Transcript whose writes fail.
    struct FullDiskTranscript;

    #[async_trait]
    impl TranscriptStore for FullDiskTranscript {
        async fn append(&self, _messages: &[ChatMessage]) -> localai_core::store::Result<()> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }

        async fn messages(&self) -> localai_core::store::Result<Vec<ChatMessage>> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> localai_core::store::Result<()> {
            Ok(())
        }
    }

    /// Transcript whose `clear` waits until released.
    #[derive(Default)]
    struct GatedTranscript {
        inner: MemoryStore,
        clearing: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TranscriptStore for GatedTranscript {
        async fn append(&self, messages: &[ChatMessage]) -> localai_core::store::Result<()> {
            self.inner.append(messages).await
        }

        async fn messages(&self) -> localai_core::store::Result<Vec<ChatMessage>> {
            self.inner.messages().await
        }

        async fn clear(&self) -> localai_core::store::Result<()> {
            self.clearing.notify_one();
            self.release.notified().await;
            self.inner.clear().await
        }
    }

    fn controller(transport: Arc<dyn ChatTransport>, store: Arc<MemoryStore>) -> ChatController {
        ChatController::new(
            transport,
            store.clone(),
            store,
            SessionTokens::new(),
            ChatOptions::default(),
        )
    }

    #[tokio::test]
    async fn completed_turn_commits_persona_user_and_assistant() {
        let transport = ScriptedTransport::replying(vec![vec![
            record("Hel"),
            record("lo!"),
            "data: [DONE]\n".to_string(),
        ]]);
        let store = Arc::new(MemoryStore::new());
        let chat = controller(transport.clone(), store.clone());

        let chunks = Arc::new(Mutex::new(String::new()));
        let sink_chunks = chunks.clone();
        chat.on_chunk(move |t| sink_chunks.lock().unwrap().push_str(t));
        let usage_calls = Arc::new(AtomicUsize::new(0));
        let counter = usage_calls.clone();
        chat.on_usage(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = chat.send("Say hello").await.unwrap();

        let (message, usage) = match outcome {
            TurnOutcome::Completed { message, usage } => (message, usage),
            TurnOutcome::Aborted => panic!("expected completion"),
        };
        assert_eq!(message.content, "Hello!");
        assert_eq!(message.tokens, Some(usage.completion_tokens));
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
        assert_eq!(*chunks.lock().unwrap(), "Hello!");
        assert_eq!(usage_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chat.state(), TurnState::Completed);
        assert_eq!(chat.session_tokens().total(), u64::from(usage.total_tokens));

        let transcript = store.messages().await.unwrap();
        let roles: Vec<Role> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);

        let requests = transport.requests();
        assert_eq!(requests[0].0.model, "llama-3.2-1b-instruct");
        assert_eq!(requests[0].0.messages.len(), 2);
        assert_eq!(requests[0].0.persona.as_deref(), Some("general"));
    }

    #[tokio::test]
    async fn follow_up_turn_sends_history_without_second_system_prompt() {
        let transport = ScriptedTransport::replying(vec![
            vec![record("one"), "data: [DONE]\n".to_string()],
            vec![record("two"), "data: [DONE]\n".to_string()],
        ]);
        let store = Arc::new(MemoryStore::new());
        let chat = controller(transport.clone(), store.clone());

        chat.send("first").await.unwrap();
        let after_first = chat.session_tokens().total();
        chat.send("second").await.unwrap();

        assert!(chat.session_tokens().total() >= after_first);
        assert_eq!(store.messages().await.unwrap().len(), 5);

        let second = &transport.requests()[1].0;
        assert_eq!(second.messages.len(), 4);
        assert_eq!(second.messages[0].role, Role::System);
        assert_eq!(second.messages[2].content, "one");
    }

    #[tokio::test]
    async fn stored_settings_override_options() {
        let transport =
            ScriptedTransport::replying(vec![vec!["data: [DONE]\n".to_string()]]);
        let store = Arc::new(MemoryStore::with_settings(
            Some("sk-stored".to_string()),
            Some("phi3".to_string()),
        ));
        let chat = controller(transport.clone(), store);

        chat.send("hi").await.unwrap();

        let (request, api_key) = &transport.requests()[0];
        assert_eq!(request.model, "phi3");
        assert_eq!(api_key.as_deref(), Some("sk-stored"));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_a_request() {
        let transport = ScriptedTransport::replying(vec![]);
        let chat = controller(transport.clone(), Arc::new(MemoryStore::new()));

        assert!(matches!(chat.send("   ").await, Err(ChatError::EmptyPrompt)));
        assert!(transport.requests().is_empty());
        assert_eq!(chat.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn transport_failure_commits_nothing() {
        let transport = Arc::new(ScriptedTransport {
            fail_with_status: Some(503),
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::new());
        let chat = controller(transport, store.clone());

        let err = chat.send("hi").await.unwrap_err();

        assert!(matches!(err, ChatError::Transport(LLMError::Api { status: 503, .. })));
        assert!(err.is_user_visible());
        assert_eq!(chat.state(), TurnState::Failed);
        assert!(store.messages().await.unwrap().is_empty());
        assert_eq!(chat.session_tokens().total(), 0);
    }

    #[tokio::test]
    async fn incomplete_stream_fails_the_turn() {
        let transport = ScriptedTransport::replying(vec![vec![record("cut off")]]);
        let store = Arc::new(MemoryStore::new());
        let chat = controller(transport, store.clone());

        let err = chat.send("hi").await.unwrap_err();

        assert!(matches!(err, ChatError::IncompleteStream { ref partial } if partial == "cut off"));
        assert_eq!(chat.state(), TurnState::Failed);
        assert!(store.messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_stream_leaves_no_transcript_trace() {
        let (opened_tx, mut opened_rx) = mpsc::unbounded_channel();
        let store = Arc::new(MemoryStore::new());
        let chat = controller(Arc::new(StallingTransport { opened: opened_tx }), store.clone());

        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
        chat.on_chunk(move |t| {
            let _ = chunk_tx.send(t.to_string());
        });

        let handle = chat.submit("tell me a story");
        opened_rx.recv().await.unwrap();
        assert_eq!(chunk_rx.recv().await.unwrap(), "partial");
        assert_eq!(chat.state(), TurnState::Streaming);

        chat.cancel();
        let outcome = handle.await.unwrap().unwrap();

        assert!(matches!(outcome, TurnOutcome::Aborted));
        assert_eq!(chat.state(), TurnState::Aborted);
        assert!(store.messages().await.unwrap().is_empty());
        assert_eq!(chat.session_tokens().total(), 0);
    }

    #[tokio::test]
    async fn cancel_while_sending_aborts_without_a_response() {
        let (opened_tx, mut opened_rx) = mpsc::unbounded_channel();
        let store = Arc::new(MemoryStore::new());
        let chat = controller(Arc::new(UnansweredTransport { opened: opened_tx }), store.clone());

        let handle = chat.submit("hello?");
        opened_rx.recv().await.unwrap();
        assert_eq!(chat.state(), TurnState::Sending);

        chat.cancel();
        let outcome = handle.await.unwrap().unwrap();

        assert!(matches!(outcome, TurnOutcome::Aborted));
        assert_eq!(chat.state(), TurnState::Aborted);
        assert!(store.messages().await.unwrap().is_empty());
        assert_eq!(chat.session_tokens().total(), 0);
    }

    #[tokio::test]
    async fn transport_error_mid_stream_fails_the_turn() {
        let store = Arc::new(MemoryStore::new());
        let chat = controller(Arc::new(ResetTransport), store.clone());

        let err = chat.send("hi").await.unwrap_err();

        assert!(matches!(err, ChatError::Transport(LLMError::Stream(_))));
        assert!(err.is_retryable());
        assert_eq!(chat.state(), TurnState::Failed);
        assert!(store.messages().await.unwrap().is_empty());
        assert_eq!(chat.session_tokens().total(), 0);
    }

    #[tokio::test]
    async fn failed_commit_leaves_session_total_untouched() {
        let transport = ScriptedTransport::replying(vec![vec![
            record("answer"),
            "data: [DONE]\n".to_string(),
        ]]);
        let usage_calls = Arc::new(AtomicUsize::new(0));
        let counter = usage_calls.clone();
        let chat = ChatController::new(
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(FullDiskTranscript),
            SessionTokens::new(),
            ChatOptions::default(),
        );
        chat.on_usage(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = chat.send("question").await.unwrap_err();

        assert!(matches!(err, ChatError::Store(StoreError::Io(_))));
        assert_eq!(chat.state(), TurnState::Failed);
        assert_eq!(chat.session_tokens().total(), 0);
        assert_eq!(usage_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_during_clear_is_busy() {
        let transport = ScriptedTransport::replying(vec![vec![
            record("later"),
            "data: [DONE]\n".to_string(),
        ]]);
        let transcript = Arc::new(GatedTranscript::default());
        let chat = ChatController::new(
            transport.clone(),
            Arc::new(MemoryStore::new()),
            transcript.clone(),
            SessionTokens::starting_at(40),
            ChatOptions::default(),
        );

        let clearing = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.clear().await })
        };
        transcript.clearing.notified().await;

        assert!(matches!(chat.send("too soon").await, Err(ChatError::Busy)));
        assert!(matches!(chat.clear().await, Err(ChatError::Busy)));
        assert!(transport.requests().is_empty());

        transcript.release.notify_one();
        clearing.await.unwrap().unwrap();
        assert_eq!(chat.session_tokens().total(), 0);

        chat.send("now").await.unwrap();
        let roles: Vec<Role> = transcript.messages().await.unwrap().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn second_submit_while_streaming_is_busy() {
        let (opened_tx, mut opened_rx) = mpsc::unbounded_channel();
        let chat = controller(
            Arc::new(StallingTransport { opened: opened_tx }),
            Arc::new(MemoryStore::new()),
        );

        let first = chat.submit("one");
        opened_rx.recv().await.unwrap();

        assert!(matches!(chat.send("two").await, Err(ChatError::Busy)));
        assert!(matches!(chat.clear().await, Err(ChatError::Busy)));

        chat.cancel();
        assert!(matches!(first.await.unwrap(), Ok(TurnOutcome::Aborted)));
    }

    #[tokio::test]
    async fn clear_resets_transcript_and_session_total() {
        let transport = ScriptedTransport::replying(vec![vec![
            record("answer"),
            "data: [DONE]\n".to_string(),
        ]]);
        let store = Arc::new(MemoryStore::new());
        let chat = controller(transport, store.clone());

        chat.send("question").await.unwrap();
        assert!(chat.session_tokens().total() > 0);

        chat.clear().await.unwrap();

        assert_eq!(chat.session_tokens().total(), 0);
        assert!(store.messages().await.unwrap().is_empty());
        assert_eq!(chat.state(), TurnState::Idle);
        assert_eq!(chat.context_level(), ContextLevel::Normal);
    }

    #[test]
    fn context_level_tracks_shared_session_total() {
        let session = SessionTokens::starting_at(7000);
        let chat = ChatController::new(
            ScriptedTransport::replying(vec![]),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            session.clone(),
            ChatOptions::default(),
        );

        assert_eq!(chat.context_level(), ContextLevel::Warning);
        session.add(500);
        assert_eq!(chat.context_level(), ContextLevel::Critical);
    }

    #[test]
    fn options_follow_config() {
        let config = Config {
            model: "mistral".to_string(),
            context_limit: 4096,
            persona: None,
            ..Config::default()
        };

        let options = ChatOptions::from(&config);
        assert_eq!(options.model, "mistral");
        assert_eq!(options.context_limit, 4096);
        assert_eq!(options.persona, None);
    }
}
