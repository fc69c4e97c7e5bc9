//! HTTP integration tests: a real axum server on an ephemeral port, called
//! with reqwest, backed by in-process providers.

mod common;

use std::sync::Arc;
use tokio::net::TcpListener;

use common::{CannedModel, HashEmbedder};
use medical_chatbot::config::RetrievalConfig;
use medical_chatbot::history::{ConversationStore, InMemoryStore};
use medical_chatbot::index::{InMemoryIndex, VectorIndex};
use medical_chatbot::models::{Chunk, IndexedEntry, Role};
use medical_chatbot::pipeline::AnswerPipeline;
use medical_chatbot::server::{serve, AppState};
use medical_chatbot::session::{SessionSigner, COOKIE_NAME};

const DIMS: usize = 64;
const SECRET: &str = "test-secret";

struct TestServer {
    base: String,
    store: Arc<InMemoryStore>,
    model: Arc<CannedModel>,
}

async fn seeded_index(embedder: &HashEmbedder) -> Arc<InMemoryIndex> {
    let index = Arc::new(InMemoryIndex::new(DIMS));
    let passages = [
        "A headache is pain or discomfort in the head or face area.",
        "Migraine headaches are often accompanied by nausea and sensitivity to light.",
        "Tension headaches are the most common type of headache among adults.",
        "Asthma is a chronic disease of the airways of the lungs.",
    ];
    let entries: Vec<IndexedEntry> = passages
        .iter()
        .map(|text| IndexedEntry {
            chunk: Chunk::new("data/Medical_book.pdf", text),
            vector: embedder.vector(text),
        })
        .collect();
    index.upsert(&entries).await.unwrap();
    index
}

async fn start(index: Arc<InMemoryIndex>, retrieval: RetrievalConfig) -> TestServer {
    let store = Arc::new(InMemoryStore::new(43_200));
    let model = Arc::new(CannedModel::default());
    let pipeline = AnswerPipeline::new(
        Arc::new(HashEmbedder::new(DIMS)),
        index,
        store.clone(),
        model.clone(),
        retrieval,
    );
    let state = AppState::new(Arc::new(pipeline), SessionSigner::new(SECRET));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve(listener, state));

    TestServer { base, store, model }
}

async fn start_default() -> TestServer {
    let index = seeded_index(&HashEmbedder::new(DIMS)).await;
    start(index, RetrievalConfig::default()).await
}

/// `chat_session_id=<value>` pair and the bare session id from a Set-Cookie header.
fn session_cookie(response: &reqwest::Response) -> Option<(String, String)> {
    let set_cookie = response.headers().get("set-cookie")?.to_str().ok()?;
    let pair = set_cookie.split(';').next()?.trim().to_string();
    let value = pair.strip_prefix(&format!("{}=", COOKIE_NAME))?;
    let id = value.split('.').next()?.to_string();
    Some((pair, id))
}

#[tokio::test]
async fn test_get_without_msg_is_bad_request() {
    let server = start_default().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/get", server.base))
        .form(&[("other", "x")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client.get(format!("{}/get", server.base)).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(server.model.calls(), 0);
}

#[tokio::test]
async fn test_blank_msg_is_bad_request() {
    let server = start_default().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/get", server.base))
        .form(&[("msg", "   ")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_answer_sets_cookie_and_stores_turns() {
    let server = start_default().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/get", server.base))
        .form(&[("msg", "What is a headache?")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (_, session_id) = session_cookie(&resp).expect("new session cookie");
    assert_eq!(session_id.len(), 12);
    assert!(resp.headers()["set-cookie"].to_str().unwrap().contains("HttpOnly"));
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let text = resp.text().await.unwrap();
    assert!(!text.is_empty());

    let turns = server.store.fetch(&session_id).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::Human);
    assert_eq!(turns[0].content, "What is a headache?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].content, text);
}

#[tokio::test]
async fn test_follow_up_with_cookie_reuses_session() {
    let server = start_default().await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{}/get", server.base))
        .form(&[("msg", "What is a headache?")])
        .send()
        .await
        .unwrap();
    let (cookie, session_id) = session_cookie(&first).unwrap();

    let second = client
        .post(format!("{}/get", server.base))
        .header("cookie", &cookie)
        .form(&[("msg", "How is a migraine different?")])
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    assert!(session_cookie(&second).is_none());

    let turns = server.store.fetch(&session_id).await.unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[2].content, "How is a migraine different?");
}

#[tokio::test]
async fn test_tampered_cookie_starts_new_session() {
    let server = start_default().await;

    let forged = format!("{}=aaaaaaaaaaaa.{}", COOKIE_NAME, "00".repeat(32));
    let resp = reqwest::Client::new()
        .post(format!("{}/get", server.base))
        .header("cookie", forged)
        .form(&[("msg", "What is a headache?")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (_, session_id) = session_cookie(&resp).expect("replacement cookie");
    assert_ne!(session_id, "aaaaaaaaaaaa");
    assert!(server.store.fetch("aaaaaaaaaaaa").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_with_query_string() {
    let server = start_default().await;
    let resp = reqwest::Client::new()
        .get(format!("{}/get", server.base))
        .query(&[("msg", "What is asthma?")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("What is asthma?"));
}

#[tokio::test]
async fn test_empty_retrieval_when_context_required() {
    let server = start(
        Arc::new(InMemoryIndex::new(DIMS)),
        RetrievalConfig {
            top_k: 3,
            require_context: true,
        },
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/get", server.base))
        .form(&[("msg", "What is a headache?")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "empty_retrieval");
    assert_eq!(server.model.calls(), 0);
}

#[tokio::test]
async fn test_index_page_and_health() {
    let server = start_default().await;
    let client = reqwest::Client::new();

    let page = client.get(format!("{}/", server.base)).send().await.unwrap();
    assert_eq!(page.status(), 200);
    let html = page.text().await.unwrap();
    assert!(html.contains("/get"));
    assert!(html.contains("name=\"msg\""));

    let health: serde_json::Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
}
