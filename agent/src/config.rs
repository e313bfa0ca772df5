use crate::QaError;
use std::sync::Arc;
use tracing::warn;
use traits::PreferenceStore;

pub const PREF_ENDPOINT: &str = "extensions.pdf-qa-helper.endpoint";
pub const PREF_API_KEY: &str = "extensions.pdf-qa-helper.apiKey";
pub const PREF_MODEL: &str = "extensions.pdf-qa-helper.model";

/// Answer service settings. Blank values are stored as empty strings and read back as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QaConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Clone)]
pub struct ConfigStore {
    prefs: Arc<dyn PreferenceStore>,
}

impl ConfigStore {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { prefs }
    }

    /// Reads the current settings. Unreadable keys count as unset.
    pub async fn load(&self) -> QaConfig {
        QaConfig {
            endpoint: self.read(PREF_ENDPOINT).await,
            api_key: self.read(PREF_API_KEY).await,
            model: self.read(PREF_MODEL).await,
        }
    }

    pub async fn save(&self, config: &QaConfig) -> Result<(), QaError> {
        self.write(PREF_ENDPOINT, config.endpoint.as_deref()).await?;
        self.write(PREF_API_KEY, config.api_key.as_deref()).await?;
        self.write(PREF_MODEL, config.model.as_deref()).await
    }

    pub async fn reset(&self) -> Result<(), QaError> {
        self.save(&QaConfig::default()).await
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.prefs.get(key).await {
            Ok(value) => normalize(value.as_deref()),
            Err(e) => {
                warn!(key, error = %e, "config: read failed");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: Option<&str>) -> Result<(), QaError> {
        let value = value.map(str::trim).unwrap_or_default();
        self.prefs
            .set(key, value)
            .await
            .map_err(QaError::PersistenceFailure)
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
