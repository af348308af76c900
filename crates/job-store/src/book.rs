//! The whole store as one serializable value. All mutations are synchronous
//! so the async store only has to lock, apply and persist.

use cartwright_core_types::{Chat, ChatId, Item, Job, JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A list entry as stored, in insertion order per chat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: u64,
    pub chat_id: ChatId,
    #[serde(flatten)]
    pub item: Item,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct JobBook {
    #[serde(default)]
    chats: Vec<Chat>,
    #[serde(default)]
    items: Vec<StoredItem>,
    #[serde(default)]
    jobs: Vec<Job>,
    #[serde(default)]
    next_item_id: u64,
}

impl JobBook {
    pub fn chat(&self, chat_id: &ChatId) -> Option<&Chat> {
        self.chats.iter().find(|chat| &chat.chat_id == chat_id)
    }

    pub fn ensure_chat(&mut self, chat_id: &ChatId) -> Chat {
        if let Some(chat) = self.chat(chat_id) {
            return chat.clone();
        }
        let chat = Chat::new(chat_id.clone());
        self.chats.push(chat.clone());
        chat
    }

    pub fn save_chat(&mut self, chat: Chat) {
        match self.chats.iter_mut().find(|c| c.chat_id == chat.chat_id) {
            Some(slot) => *slot = chat,
            None => self.chats.push(chat),
        }
    }

    pub fn add_items(&mut self, chat_id: &ChatId, items: Vec<Item>) -> usize {
        self.ensure_chat(chat_id);
        let count = items.len();
        let now = Utc::now();
        for item in items {
            self.next_item_id += 1;
            self.items.push(StoredItem {
                id: self.next_item_id,
                chat_id: chat_id.clone(),
                item,
                created_at: now,
            });
        }
        count
    }

    pub fn items(&self, chat_id: &ChatId) -> Vec<Item> {
        self.items
            .iter()
            .filter(|stored| &stored.chat_id == chat_id)
            .map(|stored| stored.item.clone())
            .collect()
    }

    pub fn clear_items(&mut self, chat_id: &ChatId) -> usize {
        let before = self.items.len();
        self.items.retain(|stored| &stored.chat_id != chat_id);
        before - self.items.len()
    }

    pub fn create_job(&mut self, chat_id: &ChatId) -> Job {
        self.ensure_chat(chat_id);
        let mut job = Job::new(chat_id.clone());
        while self.job(&job.job_id).is_some() {
            job.job_id = JobId::new();
        }
        self.jobs.push(job.clone());
        job
    }

    pub fn job(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.job_id == job_id)
    }

    pub fn update_job(&mut self, job: &Job) -> Result<(), StoreError> {
        let slot = self
            .jobs
            .iter_mut()
            .find(|existing| existing.job_id == job.job_id)
            .ok_or_else(|| StoreError::UnknownJob(job.job_id.clone()))?;
        *slot = job.clone();
        Ok(())
    }

    /// Oldest first.
    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn jobs_for_chat(&self, chat_id: &ChatId) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|job| &job.chat_id == chat_id)
            .cloned()
            .collect()
    }
}
