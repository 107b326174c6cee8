#![allow(dead_code)]

/// In-process mock of the inference service, driven by a reply script.

use axum::extract::{Multipart, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug)]
pub enum Reply {
    Json(StatusCode, Value),
    Raw(StatusCode, &'static str),
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Reply::Json(StatusCode::OK, value)
    }

    pub fn warming_up() -> Self {
        Reply::Json(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "Model is still loading. Please try again later."}),
        )
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }

    async fn respond(self) -> Response {
        let mut reply = self;
        loop {
            match reply {
                Reply::Json(status, value) => return (status, Json(value)).into_response(),
                Reply::Raw(status, body) => return (status, body).into_response(),
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CapturedRequest {
    pub fields: Vec<String>,
    pub image: Vec<u8>,
    pub color_mapping: Option<String>,
    pub authorization: Option<String>,
}

pub struct MockService {
    script: Vec<Reply>,
    hits: AtomicUsize,
    requests: Mutex<Vec<CapturedRequest>>,
}

impl MockService {
    fn next_reply(&self) -> Reply {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst);
        self.script[hit.min(self.script.len() - 1)].clone()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub service: Arc<MockService>,
}

impl MockServer {
    /// Serve `script` on both endpoints; the last reply repeats once the script runs out.
    pub async fn start(script: Vec<Reply>) -> Self {
        assert!(!script.is_empty());
        let service = Arc::new(MockService {
            script,
            hits: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/predict", post(predict))
            .route("/api/model-status", get(status))
            .with_state(service.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, service }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn predict(State(service): State<Arc<MockService>>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    let reply = service.next_reply();

    let mut captured = CapturedRequest {
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..Default::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap_or_default();
        match name.as_str() {
            "image" => captured.image = data.to_vec(),
            "color_mapping" => captured.color_mapping = Some(String::from_utf8_lossy(&data).into_owned()),
            _ => {}
        }
        captured.fields.push(name);
    }

    service.requests.lock().unwrap().push(captured);
    reply.respond().await
}

async fn status(State(service): State<Arc<MockService>>) -> Response {
    service.next_reply().respond().await
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn prediction_body(predictions: Value) -> Value {
    json!({
        "predictions": predictions,
        "clean_image": "data:image/jpeg;base64,AA==",
        "annotated_image": "data:image/jpeg;base64,AA==",
        "image_size": {"width": 512, "height": 512}
    })
}
