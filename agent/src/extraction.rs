use crate::QaError;
use records::{Attachment, DocumentRef, ExtractionResult, LibraryItem};
use std::sync::Arc;
use tracing::{debug, info, warn};
use traits::{ItemLibrary, TextExtractor};

/// One way of picking the attachment to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Ask the host for its best attachment, trashed items excluded. A best
    /// attachment that is not a PDF ends resolution with an error.
    BestAttachment,
    /// First entry of the item's attachment list that is a PDF attachment.
    ScanForPdf,
}

pub const DEFAULT_RESOLUTION: [Resolution; 2] = [Resolution::BestAttachment, Resolution::ScanForPdf];

/// Resolves a document to the plain text of its PDF.
///
/// Strategies are tried in order until one yields an attachment. Text comes
/// from the first configured backend; a failing backend is not retried and
/// no other backend is tried.
pub struct Extractor {
    library: Arc<dyn ItemLibrary>,
    backends: Vec<Arc<dyn TextExtractor>>,
    resolution: Vec<Resolution>,
}

impl Extractor {
    pub fn new(library: Arc<dyn ItemLibrary>, backends: Vec<Arc<dyn TextExtractor>>) -> Self {
        Self {
            library,
            backends,
            resolution: DEFAULT_RESOLUTION.to_vec(),
        }
    }

    pub fn with_resolution(mut self, resolution: Vec<Resolution>) -> Self {
        self.resolution = resolution;
        self
    }

    pub async fn extract(&self, doc: &DocumentRef) -> Result<ExtractionResult, QaError> {
        let item = self
            .library
            .item(doc)
            .await
            .ok_or_else(|| QaError::NotFound(doc.to_string()))?;
        if !item.is_regular() {
            return Err(QaError::InvalidTarget(doc.to_string()));
        }

        let attachment = self.resolve_attachment(&item).await?;

        let backend = self.backends.first().ok_or(QaError::UnsupportedHost)?;
        debug!(%doc, attachment = %attachment.id, backend = backend.name(), "extraction: reading text");
        let text = backend
            .extract_text(&attachment.id)
            .await
            .map_err(QaError::Extraction)?
            .filter(|text| !text.trim().is_empty())
            .ok_or(QaError::EmptyResult)?;

        info!(%doc, attachment = %attachment.id, chars = text.len(), "extraction: done");
        Ok(ExtractionResult {
            text,
            attachment_id: attachment.id,
            attachment_label: attachment.title,
        })
    }

    async fn resolve_attachment(&self, item: &LibraryItem) -> Result<Attachment, QaError> {
        for strategy in &self.resolution {
            if let Some(attachment) = self.try_strategy(*strategy, item).await? {
                debug!(doc = %item.id, ?strategy, attachment = %attachment.id, "extraction: attachment resolved");
                return Ok(attachment);
            }
        }
        Err(QaError::NoAttachment(item.id.to_string()))
    }

    /// `Ok(None)` passes to the next strategy.
    async fn try_strategy(
        &self,
        strategy: Resolution,
        item: &LibraryItem,
    ) -> Result<Option<Attachment>, QaError> {
        match strategy {
            Resolution::BestAttachment => {
                let Some(candidate) = self.library.best_attachment(&item.id, false).await else {
                    return Ok(None);
                };
                if !candidate.is_pdf() {
                    warn!(doc = %item.id, attachment = %candidate.id, "extraction: best attachment is not a PDF");
                    return Err(QaError::NoAttachment(item.id.to_string()));
                }
                Ok(Some(candidate))
            }
            Resolution::ScanForPdf => {
                for id in &item.attachment_ids {
                    let found = self.library.attachment(&item.id, id).await;
                    if let Some(candidate) = found.filter(|a| a.is_attachment && a.is_pdf()) {
                        return Ok(Some(candidate));
                    }
                }
                Ok(None)
            }
        }
    }
}
