use async_trait::async_trait;
use records::{Attachment, AttachmentId, DocumentRef, LibraryItem, ViewUpdate};

/// Durable key/value preferences owned by the host.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, String>;
    async fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

/// Item and attachment lookup in the host's library.
#[async_trait]
pub trait ItemLibrary: Send + Sync {
    async fn item(&self, doc: &DocumentRef) -> Option<LibraryItem>;
    /// Looks `id` up among the attachments of `doc` only.
    async fn attachment(&self, doc: &DocumentRef, id: &AttachmentId) -> Option<Attachment>;
    /// The host's preferred attachment for `doc`, or `None` when it has no
    /// opinion or no support for choosing one.
    async fn best_attachment(&self, doc: &DocumentRef, include_trashed: bool) -> Option<Attachment>;
}

/// A backend able to turn an attachment into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;
    async fn extract_text(&self, attachment: &AttachmentId) -> Result<Option<String>, String>;
}

/// Something on screen that can show a document's answer.
#[async_trait]
pub trait ViewSurface: Send + Sync {
    async fn render(&self, update: ViewUpdate);
}
