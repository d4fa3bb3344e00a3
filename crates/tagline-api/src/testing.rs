//! Local stand-in for the completion service and a source page, used by the
//! async tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use tagline_common::openai::{OpenAiClient, OpenAiClientConfig};

use crate::completion::Completer;

pub enum MockReply {
    /// Served as `choices[0].message.content`.
    Content(String),
    /// Served as a raw HTTP error.
    Status(u16, String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Content(json!({ "text": text.into() }).to_string())
    }

    pub fn json(value: Value) -> Self {
        MockReply::Content(value.to_string())
    }

    pub fn raw(content: &str) -> Self {
        MockReply::Content(content.to_string())
    }

    pub fn status(code: u16, body: &str) -> Self {
        MockReply::Status(code, body.to_string())
    }
}

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<Value>>,
    page: Mutex<String>,
}

pub struct MockCompletion {
    base_url: String,
    state: Arc<MockState>,
}

impl MockCompletion {
    /// Serve `replies` in order; once they run out every call gets a 500.
    pub async fn start(replies: Vec<MockReply>) -> Self {
        let state = Arc::new(MockState::default());
        *state.replies.lock().unwrap() = replies.into();

        let app = Router::new()
            .route("/chat/completions", post(chat))
            .route("/page", get(page))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn with_page(self, html: &str) -> Self {
        *self.state.page.lock().unwrap() = html.to_string();
        self
    }

    pub fn page_url(&self) -> String {
        format!("{}/page", self.base_url)
    }

    pub fn missing_page_url(&self) -> String {
        format!("{}/missing", self.base_url)
    }

    pub fn client_config(&self) -> OpenAiClientConfig {
        OpenAiClientConfig {
            base_url: self.base_url.clone(),
            api_key: Some("test-key".to_string()),
            ..OpenAiClientConfig::default()
        }
    }

    pub fn completer(&self) -> Completer {
        let client = OpenAiClient::new(self.client_config()).unwrap();
        Completer::new(Arc::new(client), "mock-model")
    }

    /// Request bodies received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The JSON user payload of the `n`th request.
    pub fn user_payload(&self, n: usize) -> Value {
        let requests = self.requests();
        let content = requests[n]["messages"][1]["content"].as_str().unwrap();
        serde_json::from_str(content).unwrap()
    }

    pub fn system_prompt(&self, n: usize) -> String {
        self.requests()[n]["messages"][0]["content"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

async fn chat(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.requests.lock().unwrap().push(body);
    let next = state.replies.lock().unwrap().pop_front();
    match next {
        Some(MockReply::Content(content)) => Json(json!({
            "id": "mock",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Some(MockReply::Status(code, body)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, body).into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no scripted reply left").into_response(),
    }
}

async fn page(State(state): State<Arc<MockState>>) -> Html<String> {
    Html(state.page.lock().unwrap().clone())
}
