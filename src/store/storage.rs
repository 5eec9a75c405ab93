use super::KeyValueStore;
use crate::models::{
    ApiConfig, BackendFamily, CustomModel, CustomModelUpdate, GeneratedImage, ModelTag,
};
use crate::{Error, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const API_CONFIG_KEY: &str = "ai-drawing-api-config";
const HISTORY_KEY: &str = "ai-drawing-history";
const CUSTOM_MODELS_KEY: &str = "ai-drawing-custom-models";

/// Built-in catalog entries, always listed ahead of user models.
pub fn default_models() -> Vec<CustomModel> {
    vec![CustomModel {
        id: "default-fal-flux-pro".to_string(),
        name: "FAL FLUX Pro".to_string(),
        value: "fal-ai/flux-pro".to_string(),
        model_type: BackendFamily::Fal,
        tag: Some(ModelTag::TextToImage),
        created_at: Utc::now().to_rfc3339(),
        is_default: Some(true),
    }]
}

/// Typed access to credentials, history and the model catalog.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.store.set(key, &serde_json::to_string(value)?)
    }

    /// Read-modify-write of one key as a single store update, so concurrent
    /// callers never overwrite each other. Leaving `None` removes the key.
    fn modify<T, R>(&self, key: &str, change: impl FnOnce(&mut Option<T>) -> R) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut outcome = None;
        self.store.update(
            key,
            Box::new(|raw: Option<String>| {
                let mut value: Option<T> = match raw {
                    Some(raw) => Some(serde_json::from_str(&raw)?),
                    None => None,
                };
                outcome = Some(change(&mut value));
                Ok(value.map(|v| serde_json::to_string(&v)).transpose()?)
            }),
        )?;
        outcome.ok_or_else(|| Error::Storage(format!("Update of '{}' did not run", key)))
    }

    fn modify_list<T, R>(&self, key: &str, change: impl FnOnce(&mut Vec<T>) -> R) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
    {
        self.modify(key, |list: &mut Option<Vec<T>>| {
            change(list.get_or_insert_with(Vec::new))
        })
    }

    pub fn get_api_config(&self) -> Result<Option<ApiConfig>> {
        self.read(API_CONFIG_KEY)
    }

    pub fn set_api_config(&self, key: &str, base_url: &str) -> Result<ApiConfig> {
        let config = ApiConfig::new(key.to_string(), base_url.to_string());
        self.write(API_CONFIG_KEY, &config)?;
        Ok(config)
    }

    pub fn remove_api_config(&self) -> Result<()> {
        self.store.remove(API_CONFIG_KEY)
    }

    /// Stamp `lastUsed` on the stored credential record, if there is one.
    pub fn mark_api_config_used(&self) -> Result<()> {
        self.modify(API_CONFIG_KEY, |config: &mut Option<ApiConfig>| {
            if let Some(config) = config {
                config.last_used = Some(Utc::now().to_rfc3339());
            }
        })
    }

    /// Rewrite a stored `http:` base URL to `https:`. Returns whether the
    /// record changed.
    pub fn upgrade_base_url_to_https(&self) -> Result<bool> {
        if !self
            .get_api_config()?
            .is_some_and(|config| config.base_url.starts_with("http:"))
        {
            return Ok(false);
        }

        self.modify(API_CONFIG_KEY, |config: &mut Option<ApiConfig>| {
            let Some(config) = config else {
                return false;
            };
            let Some(rest) = config.base_url.strip_prefix("http:") else {
                return false;
            };
            config.base_url = format!("https:{}", rest);
            warn!("Upgrading stored base URL to {}", config.base_url);
            true
        })
    }

    /// Newest first.
    pub fn get_history(&self) -> Result<Vec<GeneratedImage>> {
        Ok(self.read(HISTORY_KEY)?.unwrap_or_default())
    }

    pub fn add_to_history(&self, image: GeneratedImage) -> Result<()> {
        self.modify_list(HISTORY_KEY, |history: &mut Vec<GeneratedImage>| {
            history.insert(0, image)
        })
    }

    pub fn clear_history(&self) -> Result<()> {
        self.store.remove(HISTORY_KEY)
    }

    pub fn remove_from_history(&self, id: &str) -> Result<()> {
        self.modify_list(HISTORY_KEY, |history: &mut Vec<GeneratedImage>| {
            history.retain(|image| image.id != id)
        })
    }

    fn get_user_models(&self) -> Result<Vec<CustomModel>> {
        Ok(self.read(CUSTOM_MODELS_KEY)?.unwrap_or_default())
    }

    /// Built-in models followed by user models, keeping the first entry for
    /// each id.
    pub fn get_custom_models(&self) -> Result<Vec<CustomModel>> {
        let mut models: Vec<CustomModel> = Vec::new();
        for model in default_models().into_iter().chain(self.get_user_models()?) {
            if !models.iter().any(|m| m.id == model.id) {
                models.push(model);
            }
        }
        Ok(models)
    }

    pub fn find_model(&self, id: &str) -> Result<Option<CustomModel>> {
        Ok(self
            .get_custom_models()?
            .into_iter()
            .find(|model| model.id == id || model.value == id))
    }

    pub fn add_custom_model(&self, model: CustomModel) -> Result<()> {
        info!("Adding model {} ({})", model.name, model.value);
        self.modify_list(CUSTOM_MODELS_KEY, |models: &mut Vec<CustomModel>| {
            models.push(model)
        })
    }

    pub fn remove_custom_model(&self, id: &str) -> Result<()> {
        self.modify_list(CUSTOM_MODELS_KEY, |models: &mut Vec<CustomModel>| {
            models.retain(|model| model.id != id)
        })
    }

    /// Patch a user model in place. Unknown ids are ignored.
    pub fn update_custom_model(&self, id: &str, update: &CustomModelUpdate) -> Result<bool> {
        self.modify_list(CUSTOM_MODELS_KEY, |models: &mut Vec<CustomModel>| {
            match models.iter_mut().find(|model| model.id == id) {
                Some(model) => {
                    update.apply(model);
                    true
                }
                None => false,
            }
        })
    }
}
