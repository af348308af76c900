//! Chats, shopping lists and jobs.
//!
//! [`JobStore`] is the seam the lifecycle, scheduler and control plane talk
//! to. [`LocalJobStore`] keeps everything in memory and, when opened on a
//! path, rewrites a pretty-printed JSON snapshot after every change.

mod book;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cartwright_core_types::{Chat, ChatId, Item, Job, JobId, JobStatus};
use tokio::sync::Mutex;
use tracing::debug;

use crate::book::JobBook;
pub use crate::book::StoredItem;
pub use crate::error::StoreError;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns the chat, creating it with defaults on first contact.
    async fn ensure_chat(&self, chat_id: &ChatId) -> Result<Chat, StoreError>;
    async fn save_chat(&self, chat: Chat) -> Result<(), StoreError>;
    async fn add_items(&self, chat_id: &ChatId, items: Vec<Item>) -> Result<usize, StoreError>;
    /// Items in the order they were added.
    async fn items(&self, chat_id: &ChatId) -> Result<Vec<Item>, StoreError>;
    async fn clear_items(&self, chat_id: &ChatId) -> Result<usize, StoreError>;
    async fn create_job(&self, chat_id: &ChatId) -> Result<Job, StoreError>;
    async fn job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError>;
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;
    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;
    async fn jobs_for_chat(&self, chat_id: &ChatId) -> Result<Vec<Job>, StoreError>;

    async fn pending_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.jobs_with_status(JobStatus::Pending).await
    }
}

pub type SharedJobStore = Arc<dyn JobStore>;

#[derive(Debug, Default)]
pub struct LocalJobStore {
    book: Mutex<JobBook>,
    storage_path: Option<PathBuf>,
}

impl LocalJobStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens (or starts) a store persisted at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let book = read_book(&path).await?;
        Ok(Self {
            book: Mutex::new(book),
            storage_path: Some(path),
        })
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    async fn persist(&self, book: &JobBook) -> Result<(), StoreError> {
        let Some(path) = self.storage_path.as_ref() else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(book)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, json).await.map_err(io_err)?;
        tokio::fs::rename(&staging, path).await.map_err(io_err)?;
        debug!(path = %path.display(), "job store persisted");
        Ok(())
    }
}

async fn read_book(path: &Path) -> Result<JobBook, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(JobBook::default()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(JobBook::default());
    }
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl JobStore for LocalJobStore {
    async fn ensure_chat(&self, chat_id: &ChatId) -> Result<Chat, StoreError> {
        let mut book = self.book.lock().await;
        let known = book.chat(chat_id).is_some();
        let chat = book.ensure_chat(chat_id);
        if !known {
            self.persist(&book).await?;
        }
        Ok(chat)
    }

    async fn save_chat(&self, chat: Chat) -> Result<(), StoreError> {
        let mut book = self.book.lock().await;
        book.save_chat(chat);
        self.persist(&book).await
    }

    async fn add_items(&self, chat_id: &ChatId, items: Vec<Item>) -> Result<usize, StoreError> {
        let mut book = self.book.lock().await;
        let added = book.add_items(chat_id, items);
        self.persist(&book).await?;
        Ok(added)
    }

    async fn items(&self, chat_id: &ChatId) -> Result<Vec<Item>, StoreError> {
        Ok(self.book.lock().await.items(chat_id))
    }

    async fn clear_items(&self, chat_id: &ChatId) -> Result<usize, StoreError> {
        let mut book = self.book.lock().await;
        let removed = book.clear_items(chat_id);
        if removed > 0 {
            self.persist(&book).await?;
        }
        Ok(removed)
    }

    async fn create_job(&self, chat_id: &ChatId) -> Result<Job, StoreError> {
        let mut book = self.book.lock().await;
        let job = book.create_job(chat_id);
        self.persist(&book).await?;
        Ok(job)
    }

    async fn job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.book.lock().await.job(job_id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut book = self.book.lock().await;
        book.update_job(job)?;
        self.persist(&book).await
    }

    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        Ok(self.book.lock().await.jobs_with_status(status))
    }

    async fn jobs_for_chat(&self, chat_id: &ChatId) -> Result<Vec<Job>, StoreError> {
        Ok(self.book.lock().await.jobs_for_chat(chat_id))
    }
}
