use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Opaque handle for a bibliographic document, as handed out by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId {
    pub value: String,
}

/// Text pulled out of a document's PDF attachment. Lives for one ask only.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub text: String,
    pub attachment_id: AttachmentId,
    pub attachment_label: String,
}

impl ExtractionResult {
    /// Label for logs: the attachment title, or its id when untitled.
    pub fn display_label(&self) -> &str {
        if self.attachment_label.trim().is_empty() {
            &self.attachment_id.value
        } else {
            &self.attachment_label
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnswerRequest {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub document_text: String,
    pub question: String,
}

/// Normalized body returned by the answer service.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerPayload {
    pub body: Value,
}

impl AnswerPayload {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    /// Wraps a plain-text response as `{"answer": text}`.
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut map = serde_json::Map::new();
        map.insert("answer".to_string(), Value::String(text.into()));
        Self {
            body: Value::Object(map),
        }
    }

    /// The text to show for this payload.
    ///
    /// Prefers the `answer` field, then `data`, and falls back to the whole
    /// payload pretty-printed. Non-string fields are pretty-printed too.
    pub fn answer_text(&self) -> String {
        let field = ["answer", "data"]
            .iter()
            .filter_map(|key| self.body.get(*key))
            .find(|value| !value.is_null());
        match field {
            Some(Value::String(text)) => text.clone(),
            Some(other) => pretty(other),
            None => pretty(&self.body),
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Last question and answer stored for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Extracting,
    Requesting,
    Cancelling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Loading,
    Extracting,
    Requesting,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    /// Nothing to show: no record, or a fresh ask is underway.
    Placeholder,
    Record(AnswerRecord),
    Notice(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Regular,
    Attachment,
    Note,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: DocumentRef,
    pub kind: ItemKind,
    #[serde(default)]
    pub attachment_ids: Vec<AttachmentId>,
}

impl LibraryItem {
    pub fn is_regular(&self) -> bool {
        self.kind == ItemKind::Regular
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_true")]
    pub is_attachment: bool,
    #[serde(default)]
    pub content_type: Option<String>,
    /// First bytes of the stored file, when the host can read them.
    #[serde(default)]
    pub leading_bytes: Vec<u8>,
}

fn default_true() -> bool {
    true
}

impl Attachment {
    /// True when type metadata or the file signature says PDF.
    pub fn is_pdf(&self) -> bool {
        let by_type = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE));
        by_type || self.leading_bytes.starts_with(PDF_SIGNATURE)
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for DocumentRef {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl From<String> for DocumentRef {
    fn from(s: String) -> Self {
        DocumentRef { value: s }
    }
}

impl From<&str> for DocumentRef {
    fn from(s: &str) -> Self {
        DocumentRef {
            value: s.to_string(),
        }
    }
}

impl std::str::FromStr for DocumentRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(DocumentRef {
            value: s.to_string(),
        })
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<&str> for AttachmentId {
    fn from(s: &str) -> Self {
        AttachmentId {
            value: s.to_string(),
        }
    }
}
