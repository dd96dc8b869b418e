//! Custom system-prompt overrides
//!
//! Users can replace the system message of any task from the settings
//! dialog. Overrides are stored as one JSON object keyed by template id under
//! `storage::CUSTOM_PROMPTS_KEY` and are read fresh on every lookup so edits
//! take effect on the next request without a restart. Values are accepted
//! as-is; only blank strings are ignored.

use std::sync::Arc;

use log::warn;
use serde_json::{Map, Value};

use crate::error::StorageResult;
use crate::storage::{KeyValueStore, KeyValueStoreExt, CUSTOM_PROMPTS_KEY};

#[derive(Clone)]
pub struct CustomPromptStore {
    store: Arc<dyn KeyValueStore>,
}

impl CustomPromptStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Override for `template_id`, if one is set and non-blank
    pub fn system_message_for(&self, template_id: &str) -> Option<String> {
        let prompts = match self.store.get_json::<Map<String, Value>>(CUSTOM_PROMPTS_KEY) {
            Ok(Some(prompts)) => prompts,
            Ok(None) => return None,
            Err(e) => {
                warn!("Ignoring unreadable custom prompts: {}", e);
                return None;
            }
        };

        prompts
            .get(template_id)
            .and_then(Value::as_str)
            .filter(|message| !message.trim().is_empty())
            .map(str::to_string)
    }

    /// Store an override for `template_id`
    pub fn set_system_message(&self, template_id: &str, message: &str) -> StorageResult<()> {
        let mut prompts = self.load_all();
        prompts.insert(template_id.to_string(), Value::String(message.to_string()));
        self.store.set_json(CUSTOM_PROMPTS_KEY, &prompts)
    }

    /// Remove the override for `template_id`
    pub fn clear_system_message(&self, template_id: &str) -> StorageResult<()> {
        let mut prompts = self.load_all();
        if prompts.remove(template_id).is_some() {
            self.store.set_json(CUSTOM_PROMPTS_KEY, &prompts)?;
        }
        Ok(())
    }

    fn load_all(&self) -> Map<String, Value> {
        self.store
            .get_json::<Map<String, Value>>(CUSTOM_PROMPTS_KEY)
            .ok()
            .flatten()
            .unwrap_or_default()
    }
}
