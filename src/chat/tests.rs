use super::*;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::retrieval::Passage;
use crate::storage::StoredMessage;

struct FakeRetriever {
    script: Mutex<VecDeque<Vec<Passage>>>,
    queries: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeRetriever {
    fn scripted(script: Vec<Vec<Passage>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            queries: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<Passage>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(anyhow!("vector store unavailable"));
        }
        let mut passages = self.script.lock().unwrap().pop_front().unwrap_or_default();
        passages.truncate(limit);
        Ok(passages)
    }
}

struct FakeCompletion {
    script: Mutex<VecDeque<Option<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeCompletion {
    fn scripted(responses: Vec<Option<&str>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeCompletion {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let next = self.script.lock().unwrap().pop_front().flatten();
        match next {
            Some(text) => {
                // Stream word by word so callers see multiple deltas
                for delta in text.split_inclusive(' ') {
                    on_delta(delta);
                }
                Ok(text)
            }
            None => Err(anyhow!("completion API exploded")),
        }
    }
}

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<StoredMessage>>,
    fail: bool,
}

impl MemoryStore {
    fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn rows(&self) -> Vec<StoredMessage> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, guest_id: &str, role: Role, content: &str) -> Result<()> {
        if self.fail {
            return Err(anyhow!("database unavailable"));
        }
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(StoredMessage {
            id,
            guest_id: guest_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn history(&self, guest_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|row| row.guest_id == guest_id)
            .collect())
    }
}

fn passages(contents: &[&str]) -> Vec<Passage> {
    contents.iter().copied().map(Passage::new).collect()
}

fn test_engine(
    store: Arc<MemoryStore>,
    retriever: Arc<FakeRetriever>,
    completion: Arc<FakeCompletion>,
) -> ChatEngine {
    let app = AppConfig {
        name: "Front Desk".to_string(),
        website: "https://example.com".to_string(),
        icon: "🤖".to_string(),
        description: "test".to_string(),
        start_button_text: "Start".to_string(),
        logo_path: None,
    };
    ChatEngine::new(store, retriever, completion, &app, &RetrievalConfig::default())
}

fn active_session() -> SessionContext {
    let mut ctx = SessionContext::new(3);
    ctx.start_session();
    ctx
}

#[tokio::test]
async fn fresh_query_retrieves_literal_prompt_and_fills_buffer() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::scripted(vec![passages(&["alpha passage", "beta passage"])]);
    let completion =
        FakeCompletion::scripted(vec![Some("We offer web development and design services.")]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    assert!(ctx.buffer.is_empty());
    let report = engine
        .submit(&mut ctx, "What services do you offer?", &mut |_| {})
        .await;

    assert_eq!(
        report.response.as_deref(),
        Some("We offer web development and design services.")
    );
    assert!(report.notices.is_empty());
    assert_eq!(retriever.queries(), vec!["What services do you offer?"]);
    assert_eq!(ctx.buffer.len(), 1);

    // User then assistant rows were persisted in turn order
    let rows = store.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].role, Role::User);
    assert_eq!(rows[1].role, Role::Assistant);
}

#[tokio::test]
async fn follow_up_boosts_query_and_merges_cached_passages() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::scripted(vec![
        passages(&["alpha passage", "beta passage"]),
        passages(&["gamma passage", "alpha passage"]),
    ]);
    let completion = FakeCompletion::scripted(vec![
        Some("We offer web development services."),
        Some("Here are more details."),
    ]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    engine
        .submit(&mut ctx, "What services do you offer?", &mut |_| {})
        .await;
    let report = engine
        .submit(&mut ctx, "tell me more about that", &mut |_| {})
        .await;

    assert_eq!(report.response.as_deref(), Some("Here are more details."));

    // Boosted query: prompt followed by key terms of the buffered response
    let queries = retriever.queries();
    assert!(queries[1].starts_with("tell me more about that "));
    for term in ["we", "offer", "web", "development"] {
        assert!(queries[1].contains(term), "missing boost term: {term}");
    }

    // Knowledge string: new passages first, cached ones after, deduplicated
    let requests = completion.requests();
    let knowledge = &requests[1][1];
    assert_eq!(knowledge.role, Role::System);
    assert_eq!(
        knowledge.content,
        "Relevant knowledge:\ngamma passage\n\nalpha passage\n\nbeta passage"
    );

    assert_eq!(ctx.buffer.len(), 2);
}

#[tokio::test]
async fn topic_change_resets_buffer_before_retrieval() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::scripted(vec![
        passages(&["services passage"]),
        passages(&["hours passage"]),
    ]);
    let completion = FakeCompletion::scripted(vec![
        Some("We offer web development services."),
        Some("We are open 9 to 5."),
    ]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    engine
        .submit(&mut ctx, "What services do you offer?", &mut |_| {})
        .await;
    assert_eq!(ctx.buffer.len(), 1);

    engine
        .submit(&mut ctx, "What are your business hours?", &mut |_| {})
        .await;

    // The old topic was discarded; only the new turn is buffered and the
    // query was not boosted
    assert_eq!(ctx.buffer.len(), 1);
    assert_eq!(retriever.queries()[1], "What are your business hours?");
}

#[tokio::test]
async fn completion_failure_reports_notice_and_records_nothing() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::scripted(vec![passages(&["alpha passage"])]);
    let completion = FakeCompletion::scripted(vec![None]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    let report = engine
        .submit(&mut ctx, "What services do you offer?", &mut |_| {})
        .await;

    assert_eq!(report.response, None);
    assert_eq!(report.notices, vec![GENERIC_FAILURE_NOTICE.to_string()]);

    // No assistant message in the transcript and no assistant row persisted
    assert_eq!(ctx.messages().len(), 1);
    assert_eq!(ctx.messages()[0].role, Role::User);
    let rows = store.rows();
    assert!(rows.iter().all(|row| row.role != Role::Assistant));

    // The buffer is not updated on a failed turn
    assert!(ctx.buffer.is_empty());
}

#[tokio::test]
async fn retrieval_failure_fails_the_turn_without_calling_completion() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::failing();
    let completion = FakeCompletion::scripted(vec![Some("unused")]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    let report = engine
        .submit(&mut ctx, "What services do you offer?", &mut |_| {})
        .await;

    assert_eq!(report.response, None);
    assert_eq!(report.notices, vec![GENERIC_FAILURE_NOTICE.to_string()]);
    assert!(completion.requests().is_empty());
}

#[tokio::test]
async fn welcome_skips_retrieval_and_defers_persistence() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::scripted(vec![passages(&["alpha passage"])]);
    let completion = FakeCompletion::scripted(vec![
        Some("Hello! I am Front Desk, your assistant."),
        Some("We offer web development services."),
    ]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    let mut streamed = String::new();
    let report = engine
        .welcome(&mut ctx, &mut |delta| streamed.push_str(delta))
        .await;

    assert_eq!(
        report.response.as_deref(),
        Some("Hello! I am Front Desk, your assistant.")
    );
    assert_eq!(streamed, "Hello! I am Front Desk, your assistant.");
    assert!(retriever.queries().is_empty());
    assert!(store.rows().is_empty());

    // The welcome request carries the synthetic instruction and an empty
    // knowledge section
    let requests = completion.requests();
    assert_eq!(requests[0][1].content, "Relevant knowledge:\n");
    assert_eq!(
        requests[0].last().unwrap().content,
        "Introduce yourself and your purpose."
    );

    // A second welcome is a no-op
    let report = engine.welcome(&mut ctx, &mut |_| {}).await;
    assert_eq!(report.response, None);

    // First real input flushes the welcome before the user message
    engine
        .submit(&mut ctx, "What services do you offer?", &mut |_| {})
        .await;

    let rows = store.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].role, Role::Assistant);
    assert_eq!(rows[0].content, "Hello! I am Front Desk, your assistant.");
    assert_eq!(rows[1].role, Role::User);
    assert_eq!(rows[2].role, Role::Assistant);
}

#[tokio::test]
async fn persistence_failure_keeps_the_session_going() {
    let store = MemoryStore::failing();
    let retriever = FakeRetriever::scripted(vec![passages(&["alpha passage"])]);
    let completion = FakeCompletion::scripted(vec![Some("We offer web development services.")]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    let report = engine
        .submit(&mut ctx, "What services do you offer?", &mut |_| {})
        .await;

    // The turn still succeeds in memory, with inline notices for the writes
    assert!(report.response.is_some());
    assert!(
        report
            .notices
            .iter()
            .all(|notice| notice.starts_with("Error saving message:"))
    );
    assert_eq!(ctx.messages().len(), 2);
}

#[tokio::test]
async fn empty_retrieval_leaves_buffer_untouched() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::scripted(vec![Vec::new()]);
    let completion = FakeCompletion::scripted(vec![Some("General answer.")]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    let report = engine
        .submit(&mut ctx, "What services do you offer?", &mut |_| {})
        .await;

    assert!(report.response.is_some());
    assert!(ctx.buffer.is_empty());
}

#[tokio::test]
async fn submit_requires_an_active_session() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::scripted(vec![]);
    let completion = FakeCompletion::scripted(vec![]);
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = SessionContext::new(3);

    let report = engine.submit(&mut ctx, "hello", &mut |_| {}).await;

    assert_eq!(report.response, None);
    assert!(!report.notices.is_empty());
    assert!(completion.requests().is_empty());
}

#[tokio::test]
async fn history_window_caps_messages_sent_to_completion() {
    let store = MemoryStore::working();
    let retriever = FakeRetriever::scripted(
        (0..10)
            .map(|i| vec![Passage::new(format!("passage {i}"))])
            .collect(),
    );
    let completion = FakeCompletion::scripted(
        (0..10)
            .map(|_| Some("What are your business hours? Answered."))
            .collect(),
    );
    let engine = test_engine(store.clone(), retriever.clone(), completion.clone());
    let mut ctx = active_session();

    for _ in 0..10 {
        engine
            .submit(&mut ctx, "What are your business hours?", &mut |_| {})
            .await;
    }

    let requests = completion.requests();
    let last = requests.last().unwrap();
    // 2 leading system messages + at most HISTORY_WINDOW history entries
    assert_eq!(last.len(), 2 + HISTORY_WINDOW);
}
