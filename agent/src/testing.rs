//! Fakes for the host collaborators, shared by the unit tests.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use records::{
    Attachment, AttachmentId, DocumentRef, ItemKind, LibraryItem, PDF_CONTENT_TYPE, ViewUpdate,
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Notify, oneshot};
use traits::{ItemLibrary, PreferenceStore, TextExtractor, ViewSurface};

mockall::mock! {
    pub Prefs {}

    #[async_trait]
    impl PreferenceStore for Prefs {
        async fn get(&self, key: &str) -> Result<Option<String>, String>;
        async fn set(&self, key: &str, value: &str) -> Result<(), String>;
    }
}

pub fn pdf_attachment(id: &str, title: &str) -> Attachment {
    Attachment {
        id: AttachmentId::from(id),
        title: title.to_string(),
        is_attachment: true,
        content_type: Some(PDF_CONTENT_TYPE.to_string()),
        leading_bytes: Vec::new(),
    }
}

#[derive(Default)]
pub struct FakeLibrary {
    items: HashMap<DocumentRef, LibraryItem>,
    attachments: HashMap<AttachmentId, Attachment>,
    best: HashMap<DocumentRef, Attachment>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A regular item `doc` with one PDF attachment `<doc>-pdf`.
    pub fn with_pdf(self, doc: &str) -> Self {
        let attachment_id = format!("{doc}-pdf");
        self.with_item(doc, ItemKind::Regular, &[attachment_id.as_str()])
            .with_attachment(pdf_attachment(&attachment_id, "Full Text PDF"))
    }

    pub fn with_item(mut self, doc: &str, kind: ItemKind, attachments: &[&str]) -> Self {
        let id = DocumentRef::from(doc);
        self.items.insert(
            id.clone(),
            LibraryItem {
                id,
                kind,
                attachment_ids: attachments.iter().map(|a| AttachmentId::from(*a)).collect(),
            },
        );
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.insert(attachment.id.clone(), attachment);
        self
    }

    pub fn with_best(mut self, doc: &str, attachment: Attachment) -> Self {
        self.best.insert(DocumentRef::from(doc), attachment);
        self
    }
}

#[async_trait]
impl ItemLibrary for FakeLibrary {
    async fn item(&self, doc: &DocumentRef) -> Option<LibraryItem> {
        self.items.get(doc).cloned()
    }

    async fn attachment(&self, doc: &DocumentRef, id: &AttachmentId) -> Option<Attachment> {
        let listed = self
            .items
            .get(doc)
            .is_some_and(|item| item.attachment_ids.contains(id));
        listed.then(|| self.attachments.get(id).cloned()).flatten()
    }

    async fn best_attachment(&self, doc: &DocumentRef, _include_trashed: bool) -> Option<Attachment> {
        self.best.get(doc).cloned()
    }
}

/// Lets a test hold extraction open until it decides to release it.
#[derive(Clone, Default)]
pub struct ExtractionGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl ExtractionGate {
    pub async fn wait_entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("extraction never started");
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
pub struct FakeExtractor {
    texts: HashMap<AttachmentId, String>,
    failure: Option<String>,
    gate: Option<ExtractionGate>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, attachment: &str, text: &str) -> Self {
        self.texts.insert(AttachmentId::from(attachment), text.to_string());
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn gated(mut self) -> (Self, ExtractionGate) {
        let gate = ExtractionGate::default();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn extract_text(&self, attachment: &AttachmentId) -> Result<Option<String>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        match &self.failure {
            Some(message) => Err(message.clone()),
            None => Ok(self.texts.get(attachment).cloned()),
        }
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    updates: Mutex<Vec<ViewUpdate>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<ViewUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<ViewUpdate> {
        self.updates.lock().unwrap().last().cloned()
    }

    pub fn clear(&self) {
        self.updates.lock().unwrap().clear();
    }
}

#[async_trait]
impl ViewSurface for RecordingSurface {
    async fn render(&self, update: ViewUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(String),
    Text(u16, String),
    /// Never answers.
    Stall,
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Self::Json(body.to_string())
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Text(status, body.to_string())
    }

    pub fn stall() -> Self {
        Self::Stall
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub body: Value,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct ServiceState {
    reply: Arc<Mutex<Reply>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    arrived: Arc<Notify>,
}

/// An answer service on a loopback port.
pub struct MockAnswerService {
    addr: SocketAddr,
    state: ServiceState,
    shutdown_tx: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl MockAnswerService {
    pub async fn start(reply: Reply) -> Self {
        let state = ServiceState {
            reply: Arc::new(Mutex::new(reply)),
            seen: Arc::default(),
            arrived: Arc::default(),
        };
        let app = Router::new()
            .route("/answer", post(answer))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock answer service");
        let addr = listener.local_addr().expect("mock service address");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("run mock answer service");
        });
        Self {
            addr,
            state,
            shutdown_tx,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/answer", self.addr)
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.state.reply.lock().unwrap() = reply;
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().unwrap().clone()
    }

    pub async fn wait_for_requests(&self, count: usize) {
        let wait = async {
            while self.requests().len() < count {
                self.state.arrived.notified().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("answer service never saw the request");
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

async fn answer(State(state): State<ServiceState>, headers: HeaderMap, body: String) -> Response {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.seen.lock().unwrap().push(SeenRequest {
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
        content_type: header(CONTENT_TYPE),
        authorization: header(AUTHORIZATION),
    });
    state.arrived.notify_one();

    let reply = state.reply.lock().unwrap().clone();
    match reply {
        Reply::Json(body) => (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response(),
        Reply::Text(status, body) => {
            let status = StatusCode::from_u16(status).expect("valid status");
            (status, body).into_response()
        }
        Reply::Stall => std::future::pending::<Response>().await,
    }
}
