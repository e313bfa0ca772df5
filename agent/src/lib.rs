mod error;

pub mod answer;
pub mod config;
pub mod extraction;
pub mod history;
pub mod session;
pub mod store;
pub mod views;

#[cfg(test)]
mod testing;

pub use answer::AnswerClient;
pub use config::{ConfigStore, QaConfig};
pub use error::QaError;
pub use extraction::{Extractor, Resolution};
pub use history::HistoryStore;
pub use session::{Services, SessionController};
pub use store::MemoryPreferences;
pub use views::{DetachedView, SurfaceId, SurfaceKind, ViewSynchronizer};

pub use records::{
    AnswerPayload, AnswerRecord, AnswerRequest, Attachment, AttachmentId, DocumentRef,
    ExtractionResult, ItemKind, LibraryItem, Notice, Phase, ViewUpdate,
};
