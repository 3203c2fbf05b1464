//! End-to-end lifecycle tests driving the controller and listener with
//! in-memory fakes for the feed, summarizer, and chat platform.

#![allow(clippy::expect_used)]

use agora_bot::Controller;
use agora_bot::ControllerConfig;
use agora_bot::RationaleListener;
use agora_chat::ChatError;
use agora_chat::ChatPlatform;
use agora_chat::OptionCount;
use agora_chat::PollRequest;
use agora_chat::ThreadMessage;
use agora_chat::ThreadPost;
use agora_feed::FeedProposal;
use agora_feed::ProposalSource;
use agora_store::ProposalStatus;
use agora_store::Store;
use agora_summarizer::Summarizer;
use agora_summarizer::SummarizerError;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::Value;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeFeed {
    rows: Arc<Mutex<Vec<Value>>>,
    calls: Arc<Mutex<Vec<Option<i64>>>>,
}

impl FakeFeed {
    fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn recorded_calls(&self) -> Vec<Option<i64>> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ProposalSource for FakeFeed {
    async fn fetch_since(
        &self,
        after_block_time: Option<i64>,
    ) -> agora_feed::Result<Vec<FeedProposal>> {
        self.calls.lock().expect("lock").push(after_block_time);
        let rows = self.rows.lock().expect("lock").clone();
        let mut proposals: Vec<FeedProposal> = rows
            .into_iter()
            .filter_map(FeedProposal::from_value)
            .filter(|p| after_block_time.is_none_or(|after| p.block_time > after))
            .collect();
        proposals.sort_by_key(|p| p.block_time);
        Ok(proposals)
    }

    async fn fetch_metadata(&self, _url: &str, _expected_hash: Option<&str>) -> Option<Value> {
        None
    }
}

#[derive(Clone, Default)]
struct FakeSummarizer {
    fail: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeSummarizer {
    fn failing() -> Self {
        Self {
            fail: true,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, prompt: &str) -> agora_summarizer::Result<String> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        if self.fail {
            return Err(SummarizerError::Empty("forced failure".to_string()));
        }
        Ok("A concise generated digest.".to_string())
    }
}

#[derive(Debug, Clone)]
struct CreatedThread {
    channel_id: u64,
    title: String,
    body: String,
    poll: PollRequest,
    thread_id: u64,
}

#[derive(Default)]
struct FakeChat {
    next_id: AtomicU64,
    fail_create: AtomicBool,
    threads: Mutex<Vec<CreatedThread>>,
    posts: Mutex<Vec<(u64, String)>>,
    counts: Mutex<Vec<OptionCount>>,
    messages: Mutex<HashMap<u64, Vec<ThreadMessage>>>,
}

impl FakeChat {
    fn new() -> Arc<Self> {
        let chat = Self::default();
        chat.next_id.store(100, Ordering::SeqCst);
        Arc::new(chat)
    }

    fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    fn set_counts(&self, yes: u64, no: u64, abstain: u64) {
        *self.counts.lock().expect("lock") = vec![
            OptionCount {
                text: "Yes".to_string(),
                votes: yes,
            },
            OptionCount {
                text: "No".to_string(),
                votes: no,
            },
            OptionCount {
                text: "Abstain".to_string(),
                votes: abstain,
            },
        ];
    }

    fn add_message(&self, thread_id: u64, id: u64, author: &str, bot: bool, text: &str) {
        self.messages
            .lock()
            .expect("lock")
            .entry(thread_id)
            .or_default()
            .push(ThreadMessage {
                id,
                author: author.to_string(),
                author_is_bot: bot,
                text: text.to_string(),
                created_at: Utc::now(),
            });
    }

    fn created_threads(&self) -> Vec<CreatedThread> {
        self.threads.lock().expect("lock").clone()
    }

    fn posted_messages(&self) -> Vec<(u64, String)> {
        self.posts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn create_thread_with_poll(
        &self,
        channel_id: u64,
        title: &str,
        body: &str,
        poll: &PollRequest,
    ) -> agora_chat::Result<ThreadPost> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ChatError::api(500, "thread creation refused"));
        }
        let thread_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let poll_message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.threads.lock().expect("lock").push(CreatedThread {
            channel_id,
            title: title.to_string(),
            body: body.to_string(),
            poll: poll.clone(),
            thread_id,
        });
        Ok(ThreadPost {
            thread_id,
            poll_message_id,
        })
    }

    async fn poll_results(
        &self,
        _thread_id: u64,
        _poll_message_id: u64,
    ) -> agora_chat::Result<Vec<OptionCount>> {
        Ok(self.counts.lock().expect("lock").clone())
    }

    async fn post_message(&self, thread_id: u64, text: &str) -> agora_chat::Result<u64> {
        self.posts
            .lock()
            .expect("lock")
            .push((thread_id, text.to_string()));
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn thread_messages_after(
        &self,
        thread_id: u64,
        after: Option<u64>,
    ) -> agora_chat::Result<Vec<ThreadMessage>> {
        let map = self.messages.lock().expect("lock");
        let mut out: Vec<ThreadMessage> = map
            .get(&thread_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|m| after.is_none_or(|a| m.id > a))
            .collect();
        out.sort_by_key(|m| m.id);
        Ok(out)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────

fn proposal_row(tx_hash: &str, index: u32, block_time: i64, title: &str) -> Value {
    json!({
        "proposal_tx_hash": tx_hash,
        "proposal_index": index,
        "block_time": block_time,
        "proposal_type": "InfoAction",
        "meta_url": null,
        "meta_hash": null,
        "meta_json": { "body": { "title": title } },
        "deposit": "100000000000",
        "proposed_epoch": 450,
        "expiration": 460,
    })
}

fn test_config() -> ControllerConfig {
    ControllerConfig {
        channel_id: 555,
        poll_duration_minutes: 20_160,
        koios_base_url: "https://api.koios.rest/api/v1".to_string(),
        initial_block_time: None,
        poll_interval: Duration::from_secs(3600),
    }
}

fn controller_with(
    store: &Arc<Store>,
    feed: &FakeFeed,
    summarizer: &FakeSummarizer,
    chat: &Arc<FakeChat>,
    config: ControllerConfig,
) -> Controller<FakeFeed, FakeSummarizer, FakeChat> {
    Controller::new(
        Arc::clone(store),
        feed.clone(),
        summarizer.clone(),
        Arc::clone(chat),
        config,
    )
}

async fn seed_open_proposal(
    store: &Store,
    gaid: &str,
    thread_id: u64,
    poll_message_id: u64,
    poll_end_at: chrono::DateTime<Utc>,
) {
    store
        .insert_discovered(gaid, "Seeded Proposal", "{}", Utc::now().timestamp())
        .await
        .expect("insert");
    store
        .record_posted(gaid, thread_id, poll_message_id, Utc::now())
        .await
        .expect("record posted");
    store
        .mark_awaiting_close(gaid, poll_end_at)
        .await
        .expect("mark awaiting close");
}

// ─────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn posts_each_new_proposal_once_across_cycles() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let feed = FakeFeed::with_rows(vec![
        proposal_row("aa11", 0, 100, "First Proposal"),
        proposal_row("bb22", 0, 200, "Second Proposal"),
    ]);
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.discovery_pass().await.expect("first pass");
    controller.discovery_pass().await.expect("second pass");

    let threads = chat.created_threads();
    assert_eq!(threads.len(), 2, "each proposal posts exactly once");
    assert!(threads[0].title.contains("First Proposal"));
    assert!(threads[0].title.contains("aa11#0"));
    assert_eq!(threads[0].channel_id, 555);
    assert_eq!(threads[0].poll.duration_minutes, 20_160);
    assert!(threads[0].body.contains("A concise generated digest."));
    assert!(threads[0].body.contains("RATIONAL:"));
    assert!(threads[1].title.contains("Second Proposal"));

    let watermark = store.get_watermark().await.expect("watermark");
    assert_eq!(watermark, Some(200));
    assert_eq!(feed.recorded_calls(), vec![None, Some(200)]);
    assert_eq!(
        summarizer.prompts.lock().expect("lock").len(),
        2,
        "one digest request per proposal"
    );

    let record = store
        .get_proposal("aa11#0")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(record.status, ProposalStatus::AwaitingClose);
    assert_eq!(record.thread_id, Some(threads[0].thread_id));
    assert!(record.poll_end_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn retries_posting_after_thread_creation_failure() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let feed = FakeFeed::with_rows(vec![proposal_row("cc33", 2, 300, "Flaky Proposal")]);
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    chat.set_fail_create(true);
    controller.discovery_pass().await.expect("failing pass");

    assert_eq!(chat.created_threads().len(), 0);
    let record = store
        .get_proposal("cc33#2")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(record.status, ProposalStatus::Discovered);
    assert_eq!(
        store.get_watermark().await.expect("watermark"),
        None,
        "watermark must not move past an unposted proposal"
    );

    chat.set_fail_create(false);
    controller.discovery_pass().await.expect("recovery pass");
    controller.discovery_pass().await.expect("steady pass");

    assert_eq!(chat.created_threads().len(), 1, "posted once after recovery");
    let record = store
        .get_proposal("cc33#2")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(record.status, ProposalStatus::AwaitingClose);
    assert_eq!(store.get_watermark().await.expect("watermark"), Some(300));
}

#[tokio::test(start_paused = true)]
async fn resumes_discovered_row_after_crash() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let row = proposal_row("dd44", 0, 400, "Interrupted Proposal");
    store
        .insert_discovered(
            "dd44#0",
            "Interrupted Proposal",
            &serde_json::to_string(&row).expect("serialize"),
            Utc::now().timestamp(),
        )
        .await
        .expect("seed row");

    let feed = FakeFeed::default();
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.discovery_pass().await.expect("resume pass");

    let threads = chat.created_threads();
    assert_eq!(threads.len(), 1);
    assert!(threads[0].title.contains("Interrupted Proposal"));

    let record = store
        .get_proposal("dd44#0")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(record.status, ProposalStatus::AwaitingClose);
    assert_eq!(record.thread_id, Some(threads[0].thread_id));
    assert_eq!(store.get_watermark().await.expect("watermark"), Some(400));
}

#[tokio::test(start_paused = true)]
async fn resumes_posted_row_after_crash() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));

    // Crash window: the thread went up and was recorded, but the voting
    // window was never written, so the row is stranded at posted
    let row = proposal_row("ee66", 0, 700, "Half Posted Proposal");
    store
        .insert_discovered(
            "ee66#0",
            "Half Posted Proposal",
            &serde_json::to_string(&row).expect("serialize"),
            700,
        )
        .await
        .expect("seed row");
    let posted_at = Utc::now() - ChronoDuration::minutes(20_165);
    store
        .record_posted("ee66#0", 960, 961, posted_at)
        .await
        .expect("record posted");

    let feed = FakeFeed::with_rows(vec![row]);
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    chat.set_counts(2, 1, 0);
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.run_cycle().await;
    controller.run_cycle().await;

    assert_eq!(chat.created_threads().len(), 0, "the existing thread is kept");
    let posts = chat.posted_messages();
    assert_eq!(posts.len(), 1, "results are posted exactly once");
    assert_eq!(posts[0].0, 960);
    assert!(posts[0].1.contains("**Final Vote:** Yes"));

    let record = store
        .get_proposal("ee66#0")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(record.status, ProposalStatus::Finalized);
    assert_eq!(
        record.poll_end_at,
        Some(posted_at + ChronoDuration::minutes(20_160)),
        "window starts from the recorded posting time"
    );
    assert_eq!(
        store.get_watermark().await.expect("watermark"),
        Some(700),
        "re-offered row heals the watermark without a repost"
    );
}

#[tokio::test(start_paused = true)]
async fn resumed_posted_row_waits_out_an_open_window() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    store
        .insert_discovered("ff77#0", "Fresh Posted Proposal", "{}", 800)
        .await
        .expect("seed row");
    let posted_at = Utc::now() - ChronoDuration::minutes(10);
    store
        .record_posted("ff77#0", 970, 971, posted_at)
        .await
        .expect("record posted");

    let feed = FakeFeed::default();
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.run_cycle().await;

    assert_eq!(chat.created_threads().len(), 0);
    assert_eq!(chat.posted_messages().len(), 0, "window is still open");
    let record = store
        .get_proposal("ff77#0")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(record.status, ProposalStatus::AwaitingClose);
    assert_eq!(
        record.poll_end_at,
        Some(posted_at + ChronoDuration::minutes(20_160))
    );
}

#[tokio::test(start_paused = true)]
async fn watermark_persists_through_empty_cycles() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    store.advance_watermark(500).await.expect("seed watermark");

    let feed = FakeFeed::default();
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.discovery_pass().await.expect("empty pass");

    assert_eq!(feed.recorded_calls(), vec![Some(500)]);
    assert_eq!(store.get_watermark().await.expect("watermark"), Some(500));
    assert_eq!(chat.created_threads().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn initial_block_time_seeds_first_fetch() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let feed = FakeFeed::default();
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    let config = ControllerConfig {
        initial_block_time: Some(42),
        ..test_config()
    };
    let controller = controller_with(&store, &feed, &summarizer, &chat, config);

    controller.discovery_pass().await.expect("first pass");

    assert_eq!(feed.recorded_calls(), vec![Some(42)]);
}

#[tokio::test(start_paused = true)]
async fn announcement_falls_back_when_summarizer_fails() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let feed = FakeFeed::with_rows(vec![proposal_row("ee55", 0, 600, "Quiet Proposal")]);
    let summarizer = FakeSummarizer::failing();
    let chat = FakeChat::new();
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.discovery_pass().await.expect("pass");

    let threads = chat.created_threads();
    assert_eq!(threads.len(), 1, "summarizer failure never blocks a post");
    assert!(
        threads[0]
            .body
            .contains("AI summary generation failed. Please check the proposal details below.")
    );
}

// ─────────────────────────────────────────────────────────────────────────
// Closure
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn closure_finalizes_only_past_deadline() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    seed_open_proposal(
        &store,
        "aa11#0",
        900,
        901,
        Utc::now() - ChronoDuration::minutes(5),
    )
    .await;
    seed_open_proposal(
        &store,
        "bb22#0",
        910,
        911,
        Utc::now() + ChronoDuration::minutes(120),
    )
    .await;

    let feed = FakeFeed::default();
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    chat.set_counts(3, 1, 0);
    chat.add_message(900, 50, "alice", false, "RATIONAL: strong treasury case");
    chat.add_message(900, 51, "agora", true, "RATIONAL: bot chatter");
    chat.add_message(900, 52, "carol", false, "off-topic banter");
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.closure_pass().await.expect("closure pass");

    let posts = chat.posted_messages();
    assert_eq!(posts.len(), 1, "only the expired poll gets a results post");
    assert_eq!(posts[0].0, 900);
    assert!(posts[0].1.contains("**Final Vote:** Yes"));
    assert!(posts[0].1.contains("A concise generated digest."));

    let closed = store
        .get_proposal("aa11#0")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(closed.status, ProposalStatus::Finalized);
    assert_eq!(closed.final_vote.as_deref(), Some("Yes"));

    let rationales = store.list_rationales("aa11#0").await.expect("rationales");
    assert_eq!(rationales.len(), 1, "catch-up sweep keeps human rationales only");
    assert_eq!(rationales[0].author, "alice");
    assert_eq!(rationales[0].text, "strong treasury case");

    let open = store
        .get_proposal("bb22#0")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(open.status, ProposalStatus::AwaitingClose);
}

#[tokio::test(start_paused = true)]
async fn finalizes_with_fallback_when_summarizer_fails() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    seed_open_proposal(
        &store,
        "cc33#1",
        920,
        921,
        Utc::now() - ChronoDuration::minutes(1),
    )
    .await;
    store
        .append_rationale("cc33#1", 60, "alice", "fund it", Utc::now())
        .await
        .expect("rationale");
    store
        .append_rationale("cc33#1", 61, "bob", "good for the network", Utc::now())
        .await
        .expect("rationale");

    let feed = FakeFeed::default();
    let summarizer = FakeSummarizer::failing();
    let chat = FakeChat::new();
    chat.set_counts(2, 1, 0);
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.closure_pass().await.expect("closure pass");

    let fallback = "The community voted Yes based on 2 submitted rationales.";
    let posts = chat.posted_messages();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].1.contains(fallback));

    let record = store
        .get_proposal("cc33#1")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(record.status, ProposalStatus::Finalized);
    assert_eq!(record.final_vote.as_deref(), Some("Yes"));
    assert_eq!(record.final_rationale.as_deref(), Some(fallback));
}

#[tokio::test(start_paused = true)]
async fn zero_votes_finalize_as_abstain() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    seed_open_proposal(
        &store,
        "dd44#2",
        930,
        931,
        Utc::now() - ChronoDuration::minutes(30),
    )
    .await;

    let feed = FakeFeed::default();
    let summarizer = FakeSummarizer::default();
    let chat = FakeChat::new();
    chat.set_counts(0, 0, 0);
    let controller = controller_with(&store, &feed, &summarizer, &chat, test_config());

    controller.closure_pass().await.expect("closure pass");

    let posts = chat.posted_messages();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].1.contains("**Final Vote:** Abstain"));
    assert!(posts[0].1.contains("No rationales provided by the community."));

    let record = store
        .get_proposal("dd44#2")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(record.final_vote.as_deref(), Some("Abstain"));
}

// ─────────────────────────────────────────────────────────────────────────
// Listener
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_captures_exact_prefix_only() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    seed_open_proposal(
        &store,
        "ee55#0",
        940,
        941,
        Utc::now() + ChronoDuration::minutes(60),
    )
    .await;

    let chat = FakeChat::new();
    chat.add_message(940, 70, "alice", false, "RATIONAL: keep it");
    chat.add_message(940, 71, "agora", true, "RATIONAL: ignore bot text");
    chat.add_message(940, 72, "carol", false, "rational: lowercase prefix");
    chat.add_message(940, 73, "dave", false, "I think RATIONAL: embedded");
    chat.add_message(940, 74, "erin", false, "RATIONAL:   ");

    let listener = RationaleListener::new(Arc::clone(&store), Arc::clone(&chat));
    let stored = listener.sweep_once().await.expect("sweep");

    assert_eq!(stored, 1);
    let rationales = store.list_rationales("ee55#0").await.expect("rationales");
    assert_eq!(rationales.len(), 1);
    assert_eq!(rationales[0].author, "alice");
    assert_eq!(rationales[0].text, "keep it");
}

#[tokio::test]
async fn resweep_from_scratch_stores_nothing_new() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    seed_open_proposal(
        &store,
        "ff66#0",
        950,
        951,
        Utc::now() + ChronoDuration::minutes(60),
    )
    .await;

    let chat = FakeChat::new();
    chat.add_message(950, 80, "alice", false, "RATIONAL: sound economics");

    let first = RationaleListener::new(Arc::clone(&store), Arc::clone(&chat));
    assert_eq!(first.sweep_once().await.expect("sweep"), 1);

    // A fresh listener has no cursors and replays the whole thread; the
    // store's message-id dedup keeps the rationale single
    let second = RationaleListener::new(Arc::clone(&store), Arc::clone(&chat));
    assert_eq!(second.sweep_once().await.expect("resweep"), 0);
    let rationales = store.list_rationales("ff66#0").await.expect("rationales");
    assert_eq!(rationales.len(), 1);
}
