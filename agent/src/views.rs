use crate::QaError;
use crate::history::HistoryStore;
use futures::future::join_all;
use records::{AnswerRecord, DocumentRef, Notice, ViewUpdate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use traits::ViewSurface;
use uuid::Uuid;

pub type SurfaceId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Inline panel, owned by a session controller and pushed to on every answer.
    Panel,
    /// Results window. Reads the history store itself and is never pushed to.
    Detached,
}

struct Registration {
    kind: SurfaceKind,
    document: Option<DocumentRef>,
    surface: Arc<dyn ViewSurface>,
}

/// Registry of the surfaces currently on screen and the document each shows.
#[derive(Default)]
pub struct ViewSynchronizer {
    surfaces: Mutex<HashMap<SurfaceId, Registration>>,
}

impl ViewSynchronizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SurfaceId, Registration>> {
        self.surfaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(
        &self,
        kind: SurfaceKind,
        document: Option<DocumentRef>,
        surface: Arc<dyn ViewSurface>,
    ) -> SurfaceId {
        let id = Uuid::new_v4();
        self.registry().insert(
            id,
            Registration {
                kind,
                document,
                surface,
            },
        );
        debug!(%id, ?kind, "views: surface registered");
        id
    }

    pub fn unregister(&self, id: SurfaceId) -> bool {
        let removed = self.registry().remove(&id).is_some();
        if removed {
            debug!(%id, "views: surface unregistered");
        }
        removed
    }

    pub fn set_document(&self, id: SurfaceId, document: Option<DocumentRef>) {
        if let Some(registration) = self.registry().get_mut(&id) {
            registration.document = document;
        }
    }

    pub fn live_count(&self) -> usize {
        self.registry().len()
    }

    /// Renders to one surface. Unknown ids are ignored.
    pub async fn render(&self, id: SurfaceId, update: ViewUpdate) {
        let surface = self.registry().get(&id).map(|r| r.surface.clone());
        if let Some(surface) = surface {
            surface.render(update).await;
        }
    }

    /// Pushes `record` to every panel showing `doc` and returns how many were updated.
    pub async fn publish(&self, doc: &DocumentRef, record: &AnswerRecord) -> usize {
        let targets: Vec<Arc<dyn ViewSurface>> = self
            .registry()
            .values()
            .filter(|r| r.kind == SurfaceKind::Panel && r.document.as_ref() == Some(doc))
            .map(|r| r.surface.clone())
            .collect();
        join_all(
            targets
                .iter()
                .map(|surface| surface.render(ViewUpdate::Record(record.clone()))),
        )
        .await;
        debug!(%doc, surfaces = targets.len(), "views: record published");
        targets.len()
    }

    /// Opens a results window on `doc` and gives it its first read of the store.
    pub async fn open_detached(
        self: &Arc<Self>,
        history: HistoryStore,
        doc: DocumentRef,
        surface: Arc<dyn ViewSurface>,
    ) -> DetachedView {
        let id = self.register(SurfaceKind::Detached, Some(doc.clone()), surface.clone());
        info!(%doc, %id, "views: detached view opened");
        let view = DetachedView {
            id,
            document: doc,
            history,
            views: self.clone(),
            surface,
        };
        if let Err(e) = view.refresh().await {
            warn!(doc = %view.document, error = %e, "views: detached view could not load history");
        }
        view
    }
}

/// A results window bound to one document.
///
/// It may lag behind the panel until `refresh` is called again. Dropping it
/// unregisters the window.
pub struct DetachedView {
    id: SurfaceId,
    document: DocumentRef,
    history: HistoryStore,
    views: Arc<ViewSynchronizer>,
    surface: Arc<dyn ViewSurface>,
}

impl DetachedView {
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    /// Re-reads the stored record and renders it.
    pub async fn refresh(&self) -> Result<Option<AnswerRecord>, QaError> {
        self.surface.render(ViewUpdate::Notice(Notice::Loading)).await;
        match self.history.load(&self.document).await {
            Ok(Some(record)) => {
                self.surface.render(ViewUpdate::Record(record.clone())).await;
                Ok(Some(record))
            }
            Ok(None) => {
                self.surface.render(ViewUpdate::Placeholder).await;
                Ok(None)
            }
            Err(e) => {
                self.surface
                    .render(ViewUpdate::Notice(Notice::Failed(e.user_message())))
                    .await;
                Err(e)
            }
        }
    }

    pub fn close(self) {}
}

impl Drop for DetachedView {
    fn drop(&mut self) {
        self.views.unregister(self.id);
    }
}
