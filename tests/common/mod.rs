#![allow(dead_code)]

use async_trait::async_trait;
use axum::{ extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router };
use serde_json::{ json, Value };
use std::path::Path;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ tungstenite, WebSocketStream };
use futures::{ SinkExt, StreamExt };

use llama_chat::agent::ChatAgent;
use llama_chat::config::prompt::PromptConfig;
use llama_chat::error::ChatError;
use llama_chat::llm::chat::ollama::OllamaClient;
use llama_chat::llm::embedding::ollama::OllamaEmbeddingClient;
use llama_chat::rag::loader::{ DocumentLoader, PageDocument };
use llama_chat::rag::splitter::TextSplitter;
use llama_chat::rag::{ RagEngine, RetrievalSettings };
use llama_chat::server::api::{ self, AppState };
use llama_chat::server::websocket;
use llama_chat::session::SessionRegistry;

const GENERATE_BODY: &str = concat!(
    "{\"response\":\"Hel\",\"done\":false}\n",
    "{\"response\":\"lo\",\"done\":false}\n",
    "{\"response\":\"IGNORED\",\"done\":true,\"eval_count\":2,\"total_duration\":1000}\n"
);

/// Body of a generation cut off before its final record.
const TRUNCATED_BODY: &str = "{\"response\":\"Hel\",\"done\":false}\n";

/// Stand-in for an Ollama server: streams "Hel" + "lo" from /api/generate and
/// embeds text as presence flags of "alpha" and "beta".
#[derive(Clone, Default)]
pub struct FakeOllama {
    prompts: Arc<Mutex<Vec<String>>>,
    fail_generate: Arc<AtomicBool>,
    truncate_generate: Arc<AtomicBool>,
    embed_calls: Arc<AtomicUsize>,
}

impl FakeOllama {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn fail_generate(&self, fail: bool) {
        self.fail_generate.store(fail, Ordering::SeqCst);
    }

    /// Ends every generation after the first fragment, without a done record.
    pub fn truncate_generate(&self, truncate: bool) {
        self.truncate_generate.store(truncate, Ordering::SeqCst);
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let flag = |k: &str| if lower.contains(k) { 1.0 } else { 0.0 };
    vec![flag("alpha"), flag("beta"), 0.05]
}

async fn generate(State(fake): State<FakeOllama>, Json(body): Json<Value>) -> impl IntoResponse {
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    fake.prompts.lock().unwrap().push(prompt);
    if fake.fail_generate.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded").into_response();
    }
    let body = if fake.truncate_generate.load(Ordering::SeqCst) {
        TRUNCATED_BODY
    } else {
        GENERATE_BODY
    };
    ([("content-type", "application/x-ndjson")], body).into_response()
}

async fn embed(State(fake): State<FakeOllama>, Json(body): Json<Value>) -> impl IntoResponse {
    fake.embed_calls.fetch_add(1, Ordering::SeqCst);
    let inputs: Vec<String> = match &body["input"] {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    let embeddings: Vec<Vec<f32>> = inputs
        .iter()
        .map(|t| keyword_vector(t))
        .collect();
    Json(json!({ "embeddings": embeddings }))
}

async fn serve(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

pub async fn spawn_fake_ollama() -> (FakeOllama, String) {
    let fake = FakeOllama::default();
    let app = Router::new()
        .route("/api/generate", post(generate))
        .route("/api/embed", post(embed))
        .with_state(fake.clone());
    let port = serve(app).await;
    (fake, format!("http://127.0.0.1:{}", port))
}

/// Treats the uploaded bytes as the text of a single page.
pub struct TextLoader;

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, path: &Path) -> Result<Vec<PageDocument>, ChatError> {
        let text = std::fs::read_to_string(path)?;
        Ok(vec![PageDocument { page: 0, text }])
    }
}

pub type WsClient = WebSocketStream<DuplexStream>;

pub struct TestApp {
    pub address: String,
    pub ollama: FakeOllama,
    pub client: reqwest::Client,
    pub agent: Arc<ChatAgent>,
    pub sessions: SessionRegistry,
}

impl TestApp {
    pub async fn create_session(&self) -> String {
        let response = self.client
            .post(format!("{}/api/sessions", self.address))
            .send().await
            .expect("Failed to execute request");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["id"].as_str().expect("missing id").to_string()
    }

    pub async fn chat(&self, session: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/sessions/{}/chat", self.address, session))
            .json(&body)
            .send().await
            .expect("Failed to execute request")
    }

    pub async fn messages(&self, session: &str) -> Vec<Value> {
        self.client
            .get(format!("{}/api/sessions/{}/messages", self.address, session))
            .send().await
            .expect("Failed to execute request")
            .json().await
            .expect("Failed to parse JSON")
    }

    pub async fn upload(
        &self,
        session: &str,
        file_name: &str,
        mime_type: &str,
        data: &[u8]
    ) -> reqwest::Response {
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part
                ::bytes(data.to_vec())
                .file_name(file_name.to_string())
                .mime_str(mime_type)
                .unwrap()
        );
        self.client
            .post(format!("{}/api/sessions/{}/document", self.address, session))
            .multipart(form)
            .send().await
            .expect("Failed to execute request")
    }

    /// Opens a WebSocket connection served over an in-memory pipe, with the
    /// server requiring `required_api_key`. `query` is appended to the path
    /// and `header_key` is sent as `X-API-Key`.
    pub async fn connect_ws(
        &self,
        query: &str,
        header_key: Option<&str>,
        required_api_key: Option<&str>
    ) -> Result<WsClient, tungstenite::Error> {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let peer = "127.0.0.1:50000".parse().unwrap();
        tokio::spawn(
            websocket::process_connection(
                peer,
                server_io,
                Arc::clone(&self.agent),
                self.sessions.clone(),
                required_api_key.map(str::to_string)
            )
        );

        let mut request = format!("ws://localhost/{}", query).into_client_request()?;
        if let Some(key) = header_key {
            request.headers_mut().insert("X-API-Key", HeaderValue::from_str(key).unwrap());
        }
        let (ws, _) = tokio_tungstenite::client_async(request, client_io).await?;
        Ok(ws)
    }
}

/// Next text frame from the server, parsed as JSON.
pub async fn next_frame(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time
            ::timeout(Duration::from_secs(5), ws.next()).await
            .expect("Timed out waiting for a frame")
            .expect("Connection closed")
            .expect("Failed to read frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("Frame is not JSON");
        }
    }
}

pub async fn send_json(ws: &mut WsClient, body: Value) {
    ws.send(Message::Text(body.to_string())).await.expect("Failed to send frame");
}

async fn spawn_app_with_chat_url(ollama: FakeOllama, ollama_url: &str, chat_url: &str) -> TestApp {
    let prompt_config = Arc::new(PromptConfig::default());
    let rag = RagEngine::new(
        Arc::new(TextLoader),
        TextSplitter::new(40, 0).unwrap(),
        Arc::new(OllamaEmbeddingClient::new(Some(ollama_url.to_string()), None)),
        Arc::clone(&prompt_config),
        RetrievalSettings::default()
    );
    let chat_client = Arc::new(OllamaClient::new(Some(chat_url.to_string()), None));
    let agent = Arc::new(ChatAgent::new(chat_client, Arc::new(rag), prompt_config, 0));
    let sessions = SessionRegistry::new();

    let state = AppState {
        agent: Arc::clone(&agent),
        sessions: sessions.clone(),
        ws_url: "ws://127.0.0.1:4000".to_string(),
    };
    let port = serve(api::router(state, 1024 * 1024)).await;

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        ollama,
        client: reqwest::Client::new(),
        agent,
        sessions,
    }
}

pub async fn spawn_app() -> TestApp {
    let (ollama, url) = spawn_fake_ollama().await;
    spawn_app_with_chat_url(ollama, &url, &url).await
}

/// App whose chat model lives at an address nothing listens on.
pub async fn spawn_app_with_unreachable_model() -> TestApp {
    let (ollama, url) = spawn_fake_ollama().await;
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_url = format!("http://{}", unused.local_addr().unwrap());
    drop(unused);
    spawn_app_with_chat_url(ollama, &url, &dead_url).await
}
