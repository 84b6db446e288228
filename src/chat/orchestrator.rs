//! Conversation orchestrator
//!
//! [`Orchestrator::submit`] runs one chat turn end to end:
//!
//! 1. append the user message to the chat state
//! 2. resolve provider, model and tool-server endpoints (explicit request
//!    values first, then saved settings)
//! 3. build the model client; failing here ends the turn
//! 4. assemble built-in and remote tools
//! 5. stream the model's response, running tool calls as they arrive, for at
//!    most `max_tool_rounds` tool rounds
//! 6. append exactly one assistant message with all streamed text, even when
//!    the stream failed part way
//! 7. close every tool-server connection opened in step 4

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::chat::context::RequestContext;
use crate::chat::display::{DisplayEvent, TurnDisplay};
use crate::chat::metrics::TurnMetrics;
use crate::chat::state::{ChatMessage, ChatState, Role};
use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::error::Result;
use crate::providers::{
    BuildProvider, Completion, Message, Provider, ProviderFactory, StreamEvent, ToolCall,
};
use crate::storage::{get_non_empty, KeyValueStore, HTTP_URL_KEY, PROVIDER_KEY, SSE_URL_KEY};
use crate::tools::{self, assemble, ToolRegistry, ToolRegistryBuilder, ToolResult, ToolUpdate};

/// Tool output beyond this many bytes is cut before it reaches the model
const MAX_TOOL_OUTPUT_BYTES: usize = 64 * 1024;

/// Input for one turn
///
/// `None` (or blank) fields fall back to saved settings.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub text: String,
    pub model_id: Option<String>,
    pub provider_name: Option<String>,
    pub api_key: Option<String>,
    pub http_url: Option<String>,
    pub sse_url: Option<String>,
    pub context: RequestContext,
}

impl SubmitRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    /// The response stream failed after the turn started
    Failed(String),
}

/// What the user sees for a turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// Id of the assistant message this turn appended
    pub id: String,
    pub display: TurnDisplay,
    pub status: TurnStatus,
}

/// A turn that ran; `state` holds the user and assistant messages
#[derive(Debug)]
pub struct TurnOutcome {
    pub state: ChatState,
    pub result: TurnResult,
}

/// A turn that could not start; `state` still holds the user message
#[derive(Debug)]
pub struct TurnFailure {
    pub state: ChatState,
    pub error: anyhow::Error,
}

impl std::fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for TurnFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// Runs chat turns
pub struct Orchestrator {
    providers: Arc<dyn BuildProvider>,
    tools: ToolRegistryBuilder,
    store: Arc<dyn KeyValueStore>,
    mcp_timeout: Duration,
    max_tool_rounds: usize,
    events: Option<mpsc::UnboundedSender<DisplayEvent>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.tools)
            .field("mcp_timeout", &self.mcp_timeout)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish_non_exhaustive()
    }
}

/// State carried through the streaming phase of a turn
struct TurnRun<'a> {
    provider: &'a dyn Provider,
    registry: &'a ToolRegistry,
    metrics: &'a TurnMetrics,
    events: Option<&'a mpsc::UnboundedSender<DisplayEvent>>,
    display: TurnDisplay,
    text: String,
    rounds: usize,
}

impl Orchestrator {
    /// Orchestrator wired from configuration over `store`
    ///
    /// # Errors
    ///
    /// Returns error if the provider HTTP client cannot be built
    pub fn new(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let resolver = CredentialResolver::with_process_env(Arc::clone(&store));
        let factory = ProviderFactory::new(config.providers.clone(), resolver)?;
        Ok(Self::from_parts(
            Arc::new(factory),
            ToolRegistryBuilder::new(config.tools.clone()),
            store,
            Duration::from_secs(config.mcp.request_timeout_seconds),
            config.chat.max_tool_rounds,
        ))
    }

    pub fn from_parts(
        providers: Arc<dyn BuildProvider>,
        tools: ToolRegistryBuilder,
        store: Arc<dyn KeyValueStore>,
        mcp_timeout: Duration,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            providers,
            tools,
            store,
            mcp_timeout,
            max_tool_rounds,
            events: None,
        }
    }

    /// Push live display events for every turn to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<DisplayEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Read a saved setting; a failed read is logged and treated as unset
    fn saved(&self, key: &str) -> Option<String> {
        get_non_empty(self.store.as_ref(), key).unwrap_or_else(|e| {
            tracing::warn!("Failed to read {} from storage: {}", key, e);
            None
        })
    }

    /// Run one turn on top of `state`
    ///
    /// # Errors
    ///
    /// Returns [`TurnFailure`] when the model client cannot be built
    /// (missing key, rejected provider) or the tool registry cannot be
    /// created. A failure while streaming is not an error: the turn
    /// completes with [`TurnStatus::Failed`] and the partial text.
    pub async fn submit(
        &self,
        state: &ChatState,
        request: SubmitRequest,
    ) -> std::result::Result<TurnOutcome, TurnFailure> {
        let state = state.with_message(ChatMessage::user(request.text.clone()));

        let explicit = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let provider_name = explicit(&request.provider_name).or_else(|| self.saved(PROVIDER_KEY));
        let http_url = explicit(&request.http_url).or_else(|| self.saved(HTTP_URL_KEY));
        let sse_url = explicit(&request.sse_url).or_else(|| self.saved(SSE_URL_KEY));

        let provider = match self.providers.build_provider(
            request.model_id.as_deref(),
            provider_name.as_deref(),
            request.api_key.as_deref(),
        ) {
            Ok(provider) => provider,
            Err(error) => {
                tracing::error!("Cannot start turn: {}", error);
                return Err(TurnFailure { state, error });
            }
        };
        let metrics = TurnMetrics::new(provider.kind().name());
        tracing::info!(
            provider = %provider.kind(),
            model = %provider.model(),
            chat_id = %state.chat_id(),
            "Starting turn"
        );

        let assembly = match assemble(
            &self.tools,
            http_url.as_deref(),
            sse_url.as_deref(),
            self.mcp_timeout,
        )
        .await
        {
            Ok(assembly) => assembly,
            Err(error) => {
                metrics.record_completion(0, "failed");
                return Err(TurnFailure { state, error });
            }
        };

        let messages = compose(&request.context, &state);
        let mut run = TurnRun {
            provider: provider.as_ref(),
            registry: &assembly.registry,
            metrics: &metrics,
            events: self.events.as_ref(),
            display: TurnDisplay::default(),
            text: String::new(),
            rounds: 0,
        };
        let streamed = run.stream(messages, self.max_tool_rounds).await;

        let status = match streamed {
            Ok(()) => TurnStatus::Completed,
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Response stream failed: {}", message);
                run.emit(DisplayEvent::Error(message.clone()));
                TurnStatus::Failed(message)
            }
        };

        let assistant = ChatMessage::assistant(run.text.clone());
        let id = assistant.id.clone();
        let state = state.with_message(assistant);

        assembly.close_all().await;
        metrics.record_completion(
            run.rounds,
            match status {
                TurnStatus::Completed => "completed",
                TurnStatus::Failed(_) => "failed",
            },
        );

        Ok(TurnOutcome {
            state,
            result: TurnResult {
                id,
                display: run.display,
                status,
            },
        })
    }
}

/// System prompt followed by the conversation so far
fn compose(context: &RequestContext, state: &ChatState) -> Vec<Message> {
    std::iter::once(Message::system(context.system_prompt()))
        .chain(state.messages().iter().map(|m| {
            let message = match m.role {
                Role::User => Message::user(m.content.clone()),
                Role::Assistant => Message::assistant(m.content.clone()),
                Role::System => Message::system(m.content.clone()),
            };
            match &m.name {
                Some(name) => message.with_name(name.clone()),
                None => message,
            }
        }))
        .collect()
}

impl TurnRun<'_> {
    fn emit(&mut self, event: DisplayEvent) {
        self.display.apply(&event);
        if let Some(tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// Stream responses until the model stops calling tools
    ///
    /// After `max_rounds` tool rounds the model is asked once more without
    /// tools, so the turn ends with text.
    async fn stream(&mut self, mut messages: Vec<Message>, max_rounds: usize) -> Result<()> {
        let definitions = self.registry.all_definitions();

        loop {
            let tools: &[serde_json::Value] = if self.rounds < max_rounds {
                &definitions
            } else {
                tracing::warn!("Tool round limit ({}) reached, requesting final answer", max_rounds);
                &[]
            };

            let mut stream = self.provider.stream(&messages, tools).await?;
            let mut completion = Completion::default();
            let mut round_has_text = false;
            while let Some(event) = stream.next().await {
                let event = event?;
                if let StreamEvent::TextDelta(delta) = &event {
                    if !round_has_text && !delta.is_empty() {
                        round_has_text = true;
                        self.separate_round();
                    }
                    self.text.push_str(delta);
                    self.emit(DisplayEvent::TextDelta(delta.clone()));
                }
                completion.apply(&event);
            }

            if completion.tool_calls.is_empty() || tools.is_empty() {
                return Ok(());
            }

            self.rounds += 1;
            tracing::debug!(
                round = self.rounds,
                calls = completion.tool_calls.len(),
                "Running tool calls"
            );
            messages.push(completion.to_message());
            for call in &completion.tool_calls {
                let result = self.run_tool(call).await;
                messages.push(Message::tool_result(&call.id, result.to_message()));
            }
        }
    }

    /// Start a new paragraph when earlier rounds already produced text
    fn separate_round(&mut self) {
        let kept = self.text.trim_end().len();
        if kept > 0 {
            self.text.truncate(kept);
            self.text.push_str("\n\n");
        }
    }

    async fn run_tool(&mut self, call: &ToolCall) -> ToolResult {
        let name = call.function.name.clone();
        let result = match self.registry.get(&name) {
            None => {
                tracing::warn!(tool = %name, "Model called an unknown tool");
                ToolResult::error(format!("Tool not found: {}", name))
            }
            Some(executor) => {
                let mut updates = tools::invoke(executor, call.arguments_json());
                let mut last = None;
                while let Some(update) = updates.recv().await {
                    match update {
                        ToolUpdate::Pending(progress) => self.emit(DisplayEvent::ToolPending {
                            call_id: call.id.clone(),
                            tool: progress.tool,
                            message: progress.message,
                        }),
                        ToolUpdate::Final(result) => {
                            last = Some(result);
                            break;
                        }
                    }
                }
                last.unwrap_or_else(|| ToolResult::error("Tool ended without a result"))
            }
        };

        let result = result.truncate_if_needed(MAX_TOOL_OUTPUT_BYTES);
        self.metrics.record_tool_call(&name, result.success);
        self.emit(DisplayEvent::ToolFinished {
            call_id: call.id.clone(),
            tool: name,
            result: result.clone(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::display::DisplayPart;
    use crate::config::ToolsConfig;
    use crate::credentials::env_from_map;
    use crate::error::ParleyError;
    use crate::providers::{EventStream, ProviderKind};
    use crate::storage::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// One scripted model response: events then optionally an error
    #[derive(Clone)]
    struct Script {
        events: Vec<StreamEvent>,
        fail_with: Option<String>,
    }

    fn says(text: &str) -> Script {
        Script {
            events: vec![StreamEvent::TextDelta(text.to_string()), StreamEvent::Done],
            fail_with: None,
        }
    }

    fn calls(id: &str, tool: &str, args: &str) -> Script {
        Script {
            events: vec![
                StreamEvent::ToolCall(ToolCall::new(id, tool, args)),
                StreamEvent::Done,
            ],
            fail_with: None,
        }
    }

    #[derive(Clone, Default)]
    struct Recorded {
        requests: Arc<Mutex<Vec<(Vec<Message>, usize)>>>,
    }

    struct ScriptedProvider {
        scripts: Mutex<Vec<Script>>,
        recorded: Recorded,
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAI
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            messages: &[Message],
            tools: &[serde_json::Value],
        ) -> Result<EventStream> {
            self.recorded
                .requests
                .lock()
                .unwrap()
                .push((messages.to_vec(), tools.len()));
            let script = {
                let mut scripts = self.scripts.lock().unwrap();
                if scripts.is_empty() {
                    says("done")
                } else {
                    scripts.remove(0)
                }
            };
            let mut items: Vec<Result<StreamEvent>> = script.events.into_iter().map(Ok).collect();
            if let Some(msg) = script.fail_with {
                items.push(Err(ParleyError::Provider(msg).into()));
            }
            Ok(futures::stream::iter(items).boxed())
        }
    }

    struct ScriptedFactory {
        scripts: Vec<Script>,
        recorded: Recorded,
        built_with: Arc<Mutex<Vec<Option<String>>>>,
        fail: bool,
    }

    impl BuildProvider for ScriptedFactory {
        fn build_provider(
            &self,
            _model_id: Option<&str>,
            provider_name: Option<&str>,
            _api_key: Option<&str>,
        ) -> Result<Box<dyn Provider>> {
            self.built_with
                .lock()
                .unwrap()
                .push(provider_name.map(str::to_string));
            if self.fail {
                return Err(ParleyError::MissingCredential("OpenAI".to_string()).into());
            }
            Ok(Box::new(ScriptedProvider {
                scripts: Mutex::new(self.scripts.clone()),
                recorded: self.recorded.clone(),
            }))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        recorded: Recorded,
        built_with: Arc<Mutex<Vec<Option<String>>>>,
        store: Arc<MemoryStore>,
    }

    fn harness(scripts: Vec<Script>, fail: bool, max_rounds: usize) -> Harness {
        let recorded = Recorded::default();
        let built_with = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(MemoryStore::new());
        let factory = ScriptedFactory {
            scripts,
            recorded: recorded.clone(),
            built_with: Arc::clone(&built_with),
            fail,
        };
        let tools = ToolRegistryBuilder::new(ToolsConfig::default())
            .with_env(env_from_map(HashMap::new()));
        let orchestrator = Orchestrator::from_parts(
            Arc::new(factory),
            tools,
            store.clone(),
            Duration::from_secs(1),
            max_rounds,
        );
        Harness {
            orchestrator,
            recorded,
            built_with,
            store,
        }
    }

    #[tokio::test]
    async fn test_plain_turn_appends_user_and_assistant() {
        let h = harness(vec![says("Hello there")], false, 8);
        let state = ChatState::new();

        let outcome = h
            .orchestrator
            .submit(&state, SubmitRequest::new("Hi"))
            .await
            .unwrap();

        assert!(state.is_empty());
        let messages = outcome.state.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hi");
        assert_eq!(messages[1].content, "Hello there");
        assert_eq!(outcome.result.id, messages[1].id);
        assert_eq!(outcome.result.status, TurnStatus::Completed);
        assert_eq!(outcome.result.display.text(), "Hello there");
        assert_eq!(outcome.state.chat_id(), state.chat_id());
    }

    #[tokio::test]
    async fn test_request_starts_with_system_prompt_and_history() {
        let h = harness(vec![says("ok")], false, 8);
        let state = ChatState::new()
            .with_message(ChatMessage::user("earlier").with_name("sam"))
            .with_message(ChatMessage::assistant("reply"));

        let mut request = SubmitRequest::new("now");
        request.context.city = Some("Austin".into());
        h.orchestrator.submit(&state, request).await.unwrap();

        let requests = h.recorded.requests.lock().unwrap();
        let (messages, tool_count) = &requests[0];
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.as_deref().unwrap().contains("- city: Austin"));
        assert_eq!(messages[1].name.as_deref(), Some("sam"));
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content.as_deref(), Some("now"));
        assert!(*tool_count >= 15);
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        let h = harness(
            vec![calls("c1", "add", r#"{"a": 2, "b": 3}"#), says("2 + 3 = 5")],
            false,
            8,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = h.orchestrator.with_events(tx);

        let outcome = orchestrator
            .submit(&ChatState::new(), SubmitRequest::new("add 2 and 3"))
            .await
            .unwrap();

        let requests = h.recorded.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let (second, _) = &requests[1];
        let tool_msg = second.last().unwrap();
        assert_eq!(tool_msg.role, "tool");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_msg.content.as_deref(), Some("5"));

        assert!(matches!(
            &outcome.result.display.parts[0],
            DisplayPart::Tool(card) if card.tool == "add" && card.result.as_ref().unwrap().output == "5"
        ));
        assert_eq!(outcome.state.messages()[1].content, "2 + 3 = 5");

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert!(matches!(events[0], DisplayEvent::ToolFinished { .. }));
        assert!(matches!(events.last(), Some(DisplayEvent::TextDelta(t)) if t == "2 + 3 = 5"));
    }

    #[tokio::test]
    async fn test_tool_errors_are_returned_to_model() {
        let h = harness(
            vec![
                calls("c1", "no_such_tool", "{}"),
                calls("c2", "factorial", r#"{"n": 1000}"#),
                says("sorry"),
            ],
            false,
            8,
        );
        let outcome = h
            .orchestrator
            .submit(&ChatState::new(), SubmitRequest::new("x"))
            .await
            .unwrap();
        assert_eq!(outcome.result.status, TurnStatus::Completed);

        let requests = h.recorded.requests.lock().unwrap();
        let missing = requests[1].0.last().unwrap().content.clone().unwrap();
        assert_eq!(missing, "Error: Tool not found: no_such_tool");
        let failed = requests[2].0.last().unwrap().content.clone().unwrap();
        assert!(failed.starts_with("Error: Tool execution error: factorial"));
    }

    #[tokio::test]
    async fn test_tool_rounds_are_bounded() {
        let h = harness(
            vec![
                calls("c1", "add", r#"{"a": 1, "b": 1}"#),
                calls("c2", "add", r#"{"a": 1, "b": 1}"#),
                calls("c3", "add", r#"{"a": 1, "b": 1}"#),
            ],
            false,
            2,
        );
        h.orchestrator
            .submit(&ChatState::new(), SubmitRequest::new("loop"))
            .await
            .unwrap();

        let requests = h.recorded.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].1 > 0);
        assert_eq!(requests[2].1, 0, "final request carries no tools");
    }

    #[tokio::test]
    async fn test_stream_failure_keeps_partial_text() {
        let h = harness(
            vec![Script {
                events: vec![StreamEvent::TextDelta("Partial ans".into())],
                fail_with: Some("connection reset".into()),
            }],
            false,
            8,
        );
        let outcome = h
            .orchestrator
            .submit(&ChatState::new(), SubmitRequest::new("q"))
            .await
            .unwrap();

        assert_eq!(outcome.state.len(), 2);
        assert_eq!(outcome.state.messages()[1].content, "Partial ans");
        assert!(matches!(&outcome.result.status, TurnStatus::Failed(m) if m.contains("connection reset")));
        assert!(matches!(
            outcome.result.display.parts.last(),
            Some(DisplayPart::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_credential_is_turn_failure() {
        let h = harness(vec![], true, 8);
        let failure = h
            .orchestrator
            .submit(&ChatState::new(), SubmitRequest::new("hello"))
            .await
            .unwrap_err();

        assert_eq!(failure.state.len(), 1);
        assert_eq!(failure.state.messages()[0].content, "hello");
        assert!(matches!(
            failure.error.downcast_ref::<ParleyError>(),
            Some(ParleyError::MissingCredential(_))
        ));
        assert!(failure.to_string().contains("Settings → AI Provider"));
    }

    #[tokio::test]
    async fn test_saved_provider_used_when_not_requested() {
        let h = harness(vec![says("a"), says("b")], false, 8);
        h.store.set(PROVIDER_KEY, "Mistral").unwrap();

        h.orchestrator
            .submit(&ChatState::new(), SubmitRequest::new("one"))
            .await
            .unwrap();
        let mut explicit = SubmitRequest::new("two");
        explicit.provider_name = Some("Groq".into());
        h.orchestrator
            .submit(&ChatState::new(), explicit)
            .await
            .unwrap();

        let built = h.built_with.lock().unwrap();
        assert_eq!(built[0].as_deref(), Some("Mistral"));
        assert_eq!(built[1].as_deref(), Some("Groq"));
    }

    #[tokio::test]
    async fn test_unreachable_tool_servers_do_not_fail_turn() {
        let h = harness(vec![says("first"), says("fine")], false, 8);
        h.store.set(HTTP_URL_KEY, "http://127.0.0.1:1/mcp").unwrap();
        h.store.set(SSE_URL_KEY, "http://127.0.0.1:1/sse").unwrap();

        let prior = h
            .orchestrator
            .submit(&ChatState::new(), SubmitRequest::new("hello"))
            .await
            .unwrap()
            .state;
        assert_eq!(prior.len(), 2);

        let outcome = h
            .orchestrator
            .submit(&prior, SubmitRequest::new("hi"))
            .await
            .unwrap();
        assert_eq!(outcome.result.status, TurnStatus::Completed);

        let messages = outcome.state.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].content, "fine");

        let prior_ids: Vec<&str> = prior.messages().iter().map(|m| m.id.as_str()).collect();
        let (user, assistant) = (&messages[2], &messages[3]);
        assert_ne!(user.id, assistant.id);
        assert!(!prior_ids.contains(&user.id.as_str()));
        assert!(!prior_ids.contains(&assistant.id.as_str()));
        assert_eq!(outcome.result.id, assistant.id);
    }

    #[tokio::test]
    async fn test_text_from_separate_rounds_becomes_paragraphs() {
        let checking = Script {
            events: vec![
                StreamEvent::TextDelta("Let me check. ".to_string()),
                StreamEvent::ToolCall(ToolCall::new("c1", "add", r#"{"a": 19, "b": 1}"#)),
                StreamEvent::Done,
            ],
            fail_with: None,
        };
        let h = harness(vec![checking, says("It is 20°C")], false, 8);

        let outcome = h
            .orchestrator
            .submit(&ChatState::new(), SubmitRequest::new("weather?"))
            .await
            .unwrap();
        assert_eq!(
            outcome.state.messages()[1].content,
            "Let me check.\n\nIt is 20°C"
        );
        assert!(matches!(
            &outcome.result.display.parts[0],
            DisplayPart::Markdown { text } if text == "Let me check. "
        ));
    }
}
