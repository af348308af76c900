//! Chat-side operations: shopping list edits, location, job creation.

use std::sync::Arc;

use cartwright_core_types::{Chat, ChatId, FulfillmentMode, Item, Job, JobId};
use cartwright_job_store::SharedJobStore;
use item_parser::{parse_with_fallback, ItemInterpreter};
use tracing::info;

use crate::errors::{CartError, CartResult};

#[derive(Clone)]
pub struct ChatDesk {
    store: SharedJobStore,
    interpreter: Option<Arc<dyn ItemInterpreter>>,
}

impl ChatDesk {
    pub fn new(store: SharedJobStore, interpreter: Option<Arc<dyn ItemInterpreter>>) -> Self {
        Self { store, interpreter }
    }

    pub fn store(&self) -> &SharedJobStore {
        &self.store
    }

    /// Parses `text` and appends the items. Returns what was stored.
    pub async fn add_items(&self, chat_id: &ChatId, text: &str) -> CartResult<Vec<Item>> {
        let items = parse_with_fallback(self.interpreter.as_deref(), text).await;
        if items.is_empty() {
            return Ok(items);
        }
        self.store.ensure_chat(chat_id).await?;
        self.store.add_items(chat_id, items.clone()).await?;
        info!(%chat_id, count = items.len(), "items added");
        Ok(items)
    }

    pub async fn list(&self, chat_id: &ChatId) -> CartResult<Vec<Item>> {
        Ok(self.store.items(chat_id).await?)
    }

    pub async fn clear(&self, chat_id: &ChatId) -> CartResult<usize> {
        Ok(self.store.clear_items(chat_id).await?)
    }

    /// Stores a postal code, and optionally the fulfillment mode and store.
    pub async fn set_location(
        &self,
        chat_id: &ChatId,
        postal_code: &str,
        mode: Option<FulfillmentMode>,
        store_name: Option<String>,
    ) -> CartResult<Chat> {
        let mut chat = self.store.ensure_chat(chat_id).await?;
        chat.postal_code = Some(normalize_postal(postal_code)).filter(|p| !p.is_empty());
        if let Some(mode) = mode {
            chat.fulfillment_mode = mode;
        }
        if let Some(name) = store_name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            chat.store = Some(name);
        }
        self.store.save_chat(chat.clone()).await?;
        info!(%chat_id, mode = %chat.fulfillment_mode, "location saved");
        Ok(chat)
    }

    /// Queues a cart build. Refuses chats with an empty list.
    pub async fn create_job(&self, chat_id: &ChatId) -> CartResult<Job> {
        if self.store.items(chat_id).await?.is_empty() {
            return Err(CartError::NoItems(chat_id.clone()));
        }
        let job = self.store.create_job(chat_id).await?;
        info!(%chat_id, job_id = %job.job_id, "job created");
        Ok(job)
    }

    pub async fn job(&self, job_id: &JobId) -> CartResult<Job> {
        self.store
            .job(job_id)
            .await?
            .ok_or_else(|| CartError::JobNotFound(job_id.clone()))
    }
}

fn normalize_postal(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}
