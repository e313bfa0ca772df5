use crate::answer::AnswerClient;
use crate::config::{ConfigStore, QaConfig};
use crate::extraction::Extractor;
use crate::history::HistoryStore;
use crate::views::{DetachedView, SurfaceId, SurfaceKind, ViewSynchronizer};
use crate::QaError;
use records::{AnswerRecord, AnswerRequest, DocumentRef, Notice, Phase, ViewUpdate};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use traits::{ItemLibrary, PreferenceStore, TextExtractor, ViewSurface};

const MAX_ACTIVITY_LINES: usize = 200;

/// Collaborators shared by every panel of one host process.
#[derive(Clone)]
pub struct Services {
    config: ConfigStore,
    history: HistoryStore,
    extractor: Arc<Extractor>,
    client: AnswerClient,
    views: Arc<ViewSynchronizer>,
    clock: Arc<AtomicI64>,
}

impl Services {
    pub fn new(
        prefs: Arc<dyn PreferenceStore>,
        library: Arc<dyn ItemLibrary>,
        extractors: Vec<Arc<dyn TextExtractor>>,
    ) -> Self {
        Self {
            config: ConfigStore::new(prefs.clone()),
            history: HistoryStore::new(prefs),
            extractor: Arc::new(Extractor::new(library, extractors)),
            client: AnswerClient::new(),
            views: ViewSynchronizer::new(),
            clock: Arc::default(),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn views(&self) -> &Arc<ViewSynchronizer> {
        &self.views
    }

    /// Wall-clock epoch millis, never lower than a value handed out before.
    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self.clock.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}

#[derive(Default)]
struct SessionState {
    document: Option<DocumentRef>,
    pending: Option<CancellationToken>,
    busy: bool,
    phase: Phase,
    mounted: bool,
}

/// Drives one panel: extraction, the answer request, persistence and display.
///
/// At most one ask runs at a time; a second one is rejected rather than
/// queued. Extraction cannot be interrupted, so a cancel that arrives during
/// it takes effect before the request is sent.
pub struct SessionController {
    services: Services,
    panel: SurfaceId,
    state: Mutex<SessionState>,
    activity: Mutex<VecDeque<String>>,
}

/// Returns the controller to idle when an ask ends, however it ends.
struct BusyGuard<'a> {
    controller: &'a SessionController,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.controller.state();
        state.busy = false;
        state.pending = None;
        state.phase = Phase::Idle;
    }
}

impl SessionController {
    /// Registers `panel` with the view synchronizer and shows the placeholder.
    pub async fn mount(services: Services, panel: Arc<dyn ViewSurface>) -> Self {
        let id = services.views.register(SurfaceKind::Panel, None, panel);
        let controller = Self {
            services,
            panel: id,
            state: Mutex::new(SessionState {
                mounted: true,
                ..SessionState::default()
            }),
            activity: Mutex::new(VecDeque::new()),
        };
        controller.services.views.render(id, ViewUpdate::Placeholder).await;
        info!(panel = %id, "session: panel mounted");
        controller
    }

    /// Cancels anything in flight and detaches the panel. Later asks are rejected.
    pub fn unmount(&self) {
        let was_mounted = {
            let mut state = self.state();
            if let Some(token) = &state.pending {
                token.cancel();
                state.phase = Phase::Cancelling;
            }
            std::mem::replace(&mut state.mounted, false)
        };
        if was_mounted {
            self.services.views.unregister(self.panel);
            info!(panel = %self.panel, "session: panel unmounted");
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn panel_id(&self) -> SurfaceId {
        self.panel
    }

    pub fn is_busy(&self) -> bool {
        self.state().busy
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn document(&self) -> Option<DocumentRef> {
        self.state().document.clone()
    }

    /// The most recent activity lines, oldest first.
    pub fn activity(&self) -> Vec<String> {
        self.activity
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn log(&self, message: impl AsRef<str>) {
        let line = format!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            message.as_ref()
        );
        if let Ok(mut lines) = self.activity.lock() {
            lines.push_back(line);
            while lines.len() > MAX_ACTIVITY_LINES {
                lines.pop_front();
            }
        }
    }

    pub async fn get_config(&self) -> QaConfig {
        self.services.config.load().await
    }

    /// Renders to this panel, but only while it still shows `doc`.
    async fn render_for(&self, doc: &DocumentRef, update: ViewUpdate) {
        let current = self.state().document.as_ref() == Some(doc);
        if current {
            self.services.views.render(self.panel, update).await;
        }
    }

    fn ensure_idle(&self) -> Result<(), QaError> {
        let state = self.state();
        if !state.mounted {
            return Err(QaError::InvalidRequest("the panel is closed".to_string()));
        }
        if state.busy {
            return Err(QaError::Busy);
        }
        Ok(())
    }

    /// Marks the session busy on `doc`, atomically with the busy check.
    fn begin(&self, doc: &DocumentRef) -> Result<(CancellationToken, BusyGuard<'_>), QaError> {
        let token = CancellationToken::new();
        {
            let mut state = self.state();
            if !state.mounted {
                return Err(QaError::InvalidRequest("the panel is closed".to_string()));
            }
            if state.busy {
                return Err(QaError::Busy);
            }
            state.busy = true;
            state.phase = Phase::Extracting;
            state.pending = Some(token.clone());
            state.document = Some(doc.clone());
        }
        self.services.views.set_document(self.panel, Some(doc.clone()));
        Ok((token, BusyGuard { controller: self }))
    }

    fn enter_requesting(&self, token: &CancellationToken) -> Result<(), QaError> {
        let mut state = self.state();
        if token.is_cancelled() {
            return Err(QaError::Cancelled);
        }
        state.phase = Phase::Requesting;
        Ok(())
    }

    /// Asks `question` about `doc` and shows the answer.
    ///
    /// Bad input, a missing endpoint or a running ask reject the call before
    /// anything changes. Failures after that are shown on the panel; a
    /// cancelled ask returns [`QaError::Cancelled`] and stores nothing.
    pub async fn ask(&self, doc: Option<DocumentRef>, question: &str) -> Result<AnswerRecord, QaError> {
        let question = question.trim();
        let Some(doc) = doc else {
            self.log("No item selected");
            return Err(QaError::InvalidRequest("no document is selected".to_string()));
        };
        if question.is_empty() {
            self.log("Enter a question first");
            return Err(QaError::InvalidRequest("the question is empty".to_string()));
        }
        self.ensure_idle()?;

        let config = self.services.config.load().await;
        let Some(endpoint) = config.endpoint.clone() else {
            self.log("Set the answer service endpoint in the preferences first");
            return Err(QaError::InvalidRequest(
                "no answer service endpoint is configured".to_string(),
            ));
        };

        let (token, _guard) = self.begin(&doc)?;
        info!(%doc, question_chars = question.len(), "session: ask started");
        self.log("Extracting text...");
        self.render_for(&doc, ViewUpdate::Placeholder).await;
        self.render_for(&doc, ViewUpdate::Notice(Notice::Extracting)).await;

        let result = self.run(&doc, question, endpoint, &config, &token).await;
        if let Err(e) = &result {
            self.report(&doc, e).await;
        }
        result
    }

    async fn run(
        &self,
        doc: &DocumentRef,
        question: &str,
        endpoint: String,
        config: &QaConfig,
        token: &CancellationToken,
    ) -> Result<AnswerRecord, QaError> {
        let extraction = self.services.extractor.extract(doc).await?;
        self.log(format!("Extracted attachment: {}", extraction.display_label()));

        self.enter_requesting(token)?;
        self.log("Sending request...");
        self.render_for(doc, ViewUpdate::Notice(Notice::Requesting)).await;

        let request = AnswerRequest {
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            document_text: extraction.text,
            question: question.to_string(),
        };
        let payload = self.services.client.send(&request, token).await?;

        let record = AnswerRecord {
            question: question.to_string(),
            answer: payload.answer_text(),
            timestamp: self.services.next_timestamp(),
        };
        self.log("Request complete");
        info!(%doc, answer_chars = record.answer.len(), "session: answer received");

        self.services.history.save(doc, &record).await;
        self.services.views.publish(doc, &record).await;
        Ok(record)
    }

    async fn report(&self, doc: &DocumentRef, err: &QaError) {
        if err.is_cancelled() {
            info!(%doc, "session: ask cancelled");
            self.log("Request cancelled");
            self.render_for(doc, ViewUpdate::Notice(Notice::Cancelled)).await;
        } else {
            error!(%doc, error = %err, "session: ask failed");
            if err.is_extraction() {
                self.log(format!("Extraction failed: {}", err.user_message()));
            } else {
                self.log(format!("Error: {}", err.user_message()));
            }
            self.render_for(doc, ViewUpdate::Notice(Notice::Failed(err.user_message())))
                .await;
        }
    }

    /// Fires the pending request's token. Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        let mut state = self.state();
        if !state.busy {
            return false;
        }
        match &state.pending {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                state.phase = Phase::Cancelling;
                drop(state);
                self.log("Cancelling...");
                true
            }
            _ => false,
        }
    }

    /// Follows the host's selection.
    ///
    /// Moving to another document cancels the running ask first. The panel
    /// then shows the stored record for the new document, or the placeholder.
    pub async fn load_for_document(&self, doc: Option<DocumentRef>) -> Option<AnswerRecord> {
        let (changed, busy) = {
            let mut state = self.state();
            let changed = state.document != doc;
            if changed {
                if let Some(token) = state.pending.as_ref().filter(|t| !t.is_cancelled()) {
                    token.cancel();
                    state.phase = Phase::Cancelling;
                }
                state.document = doc.clone();
            }
            (changed, state.busy)
        };
        if changed {
            self.services.views.set_document(self.panel, doc.clone());
        }

        let Some(doc) = doc else {
            self.log("No item selected");
            self.services.views.render(self.panel, ViewUpdate::Placeholder).await;
            return None;
        };

        let record = match self.services.history.load(&doc).await {
            Ok(record) => record,
            Err(e) => {
                warn!(%doc, error = %e, "session: could not load history");
                self.log(format!("Could not load history: {}", e.user_message()));
                None
            }
        };

        // Same document while an ask runs: keep its progress on screen.
        if !changed && busy {
            return record;
        }
        let update = match &record {
            Some(record) => ViewUpdate::Record(record.clone()),
            None => ViewUpdate::Placeholder,
        };
        self.render_for(&doc, update).await;
        record
    }

    /// Opens a results window that reads the stored record for `doc` on its own.
    pub async fn open_detached_view(
        &self,
        doc: Option<DocumentRef>,
        surface: Arc<dyn ViewSurface>,
    ) -> Result<DetachedView, QaError> {
        let Some(doc) = doc else {
            self.log("No item selected");
            return Err(QaError::InvalidRequest("no document is selected".to_string()));
        };
        Ok(self
            .services
            .views
            .open_detached(self.services.history.clone(), doc, surface)
            .await)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.unmount();
    }
}
