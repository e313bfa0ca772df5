use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use traits::PreferenceStore;

/// Preferences held in memory, for hosts without durable storage and for tests.
#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferences {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        let values = self.values.lock().map_err(|e| e.to_string())?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut values = self.values.lock().map_err(|e| e.to_string())?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
