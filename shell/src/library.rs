use async_trait::async_trait;
use records::{Attachment, AttachmentId, DocumentRef, ItemKind, LibraryItem};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::warn;
use traits::{ItemLibrary, TextExtractor};

const ITEM_FILE: &str = "item.json";
const SIGNATURE_LEN: usize = 8;

#[derive(Debug, Deserialize)]
struct ItemFile {
    kind: ItemKind,
    #[serde(default)]
    best_attachment: Option<String>,
    #[serde(default)]
    attachments: Vec<AttachmentFile>,
}

#[derive(Debug, Deserialize)]
struct AttachmentFile {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content_type: Option<String>,
    /// Stored file, relative to the item directory.
    #[serde(default)]
    file: Option<String>,
    #[serde(default = "default_true")]
    is_attachment: bool,
    #[serde(default)]
    trashed: bool,
}

fn default_true() -> bool {
    true
}

/// A library laid out as `<root>/<document>/item.json`.
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_item(&self, dir: &Path) -> Option<ItemFile> {
        let path = dir.join(ITEM_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "library: unreadable item");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "library: malformed item");
                None
            }
        }
    }

    async fn to_attachment(&self, dir: &Path, file: &AttachmentFile) -> Attachment {
        let leading_bytes = match &file.file {
            Some(name) => read_signature(&dir.join(name)).await,
            None => Vec::new(),
        };
        Attachment {
            id: AttachmentId::from(file.id.as_str()),
            title: file.title.clone(),
            is_attachment: file.is_attachment,
            content_type: file.content_type.clone(),
            leading_bytes,
        }
    }

    fn item_dir(&self, doc: &DocumentRef) -> Option<PathBuf> {
        let name = doc.as_ref();
        let plain = !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != "..";
        plain.then(|| self.root.join(name))
    }
}

async fn read_signature(path: &Path) -> Vec<u8> {
    let mut buf = vec![0u8; SIGNATURE_LEN];
    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return Vec::new();
    };
    match file.read(&mut buf).await {
        Ok(n) => {
            buf.truncate(n);
            buf
        }
        Err(_) => Vec::new(),
    }
}

#[async_trait]
impl ItemLibrary for DirectoryLibrary {
    async fn item(&self, doc: &DocumentRef) -> Option<LibraryItem> {
        let dir = self.item_dir(doc)?;
        let file = self.read_item(&dir).await?;
        Some(LibraryItem {
            id: doc.clone(),
            kind: file.kind,
            attachment_ids: file
                .attachments
                .iter()
                .map(|a| AttachmentId::from(a.id.as_str()))
                .collect(),
        })
    }

    async fn attachment(&self, doc: &DocumentRef, id: &AttachmentId) -> Option<Attachment> {
        let dir = self.item_dir(doc)?;
        let item = self.read_item(&dir).await?;
        let found = item.attachments.iter().find(|a| a.id == id.value)?;
        Some(self.to_attachment(&dir, found).await)
    }

    async fn best_attachment(&self, doc: &DocumentRef, include_trashed: bool) -> Option<Attachment> {
        let dir = self.item_dir(doc)?;
        let item = self.read_item(&dir).await?;
        let best = item.best_attachment.as_deref()?;
        let file = item
            .attachments
            .iter()
            .find(|a| a.id == best && (include_trashed || !a.trashed))?;
        Some(self.to_attachment(&dir, file).await)
    }
}

/// Text the host already indexed, at `<root>/<attachment>.txt`.
pub struct FulltextCache {
    root: PathBuf,
}

impl FulltextCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TextExtractor for FulltextCache {
    fn name(&self) -> &str {
        "fulltext-cache"
    }

    async fn extract_text(&self, attachment: &AttachmentId) -> Result<Option<String>, String> {
        if attachment.value.contains(['/', '\\']) {
            return Err(format!("invalid attachment id '{attachment}'"));
        }
        let path = self.root.join(format!("{attachment}.txt"));
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("reading {}: {e}", path.display())),
        }
    }
}
