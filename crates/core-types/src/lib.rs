use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while manipulating shared domain records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid job transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("unknown job status '{0}'")]
    UnknownStatus(String),
    #[error("unknown fulfillment mode '{0}'")]
    UnknownMode(String),
}

/// Identifier handed to us by the chat platform.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short job identifier: the first eight hex digits of a v4 uuid.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(raw[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum FulfillmentMode {
    #[default]
    Delivery,
    Pickup,
}

impl FulfillmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentMode::Delivery => "delivery",
            FulfillmentMode::Pickup => "pickup",
        }
    }
}

impl FromStr for FulfillmentMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delivery" => Ok(FulfillmentMode::Delivery),
            "pickup" => Ok(FulfillmentMode::Pickup),
            other => Err(CoreError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for FulfillmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the user's shopping list after constraint parsing.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub name: String,
    pub quantity: u32,
    pub brand: Option<String>,
    pub max_price: Option<f64>,
}

impl Item {
    /// Builds an item, clamping the quantity to at least one.
    pub fn new(name: impl Into<String>, quantity: i64) -> Self {
        Self {
            name: name.into(),
            quantity: clamp_quantity(quantity),
            brand: None,
            max_price: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_max_price(mut self, price: f64) -> Self {
        self.max_price = Some(price);
        self
    }

    /// Human label used in add/fail reports, e.g. "Lactantia milk".
    pub fn label(&self) -> String {
        match self.brand.as_deref() {
            Some(brand) if !brand.is_empty() => format!("{} {}", brand, self.name),
            _ => self.name.clone(),
        }
    }

    /// Query string typed into the retailer search box.
    pub fn search_query(&self) -> String {
        self.label()
    }
}

pub fn clamp_quantity(raw: i64) -> u32 {
    raw.clamp(1, u32::MAX as i64) as u32
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chat {
    pub chat_id: ChatId,
    pub fulfillment_mode: FulfillmentMode,
    pub postal_code: Option<String>,
    pub store: Option<String>,
}

impl Chat {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            fulfillment_mode: FulfillmentMode::default(),
            postal_code: None,
            store: None,
        }
    }
}

/// Job lifecycle states.
///
/// `pending -> running -> {done | failed | needs_user}` and `needs_user -> pending`
/// on resume. A job that fails validation before dispatch may go straight from
/// `pending` to `failed`; `running -> pending` is reserved for reclaiming runs
/// abandoned by a process restart.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    NeedsUser,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::NeedsUser => "needs_user",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// States after which a completion callback fires for the current run.
    pub fn ends_run(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Failed | JobStatus::NeedsUser
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Done)
                | (Running, Failed)
                | (Running, NeedsUser)
                | (Running, Pending)
                | (NeedsUser, Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "needs_user" => Ok(JobStatus::NeedsUser),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    pub job_id: JobId,
    pub chat_id: ChatId,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub screenshot_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(chat_id: ChatId) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(),
            chat_id,
            status: JobStatus::Pending,
            result_url: None,
            error: None,
            screenshot_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the job to `next`, refusing edges the state machine does not allow.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A scraped search result considered for selection. Never persisted.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateProduct {
    pub title: String,
    pub brand: String,
    pub price: Option<f64>,
    pub badges: Vec<String>,
    pub url: String,
    pub sponsored: bool,
}

impl CandidateProduct {
    pub fn has_badge(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.badges
            .iter()
            .any(|badge| badge.to_ascii_lowercase().contains(&needle))
    }
}

/// Result of one automation step.
///
/// `Challenge` is session-scoped and must never be retried at item level;
/// `Failure` is transient automation noise.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Challenge(String),
    Failure(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_challenge(&self) -> bool {
        matches!(self, Outcome::Challenge(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Challenge(reason) => Outcome::Challenge(reason),
            Outcome::Failure(reason) => Outcome::Failure(reason),
        }
    }

    /// Chains a follow-up step, short-circuiting challenges and failures.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Success(value) => f(value),
            Outcome::Challenge(reason) => Outcome::Challenge(reason),
            Outcome::Failure(reason) => Outcome::Failure(reason),
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for Outcome<T> {
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err.to_string()),
        }
    }
}

/// What the chat layer receives once a run settles.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct JobReport {
    pub job_id: JobId,
    pub chat_id: ChatId,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub added: Vec<String>,
    pub failed: Vec<String>,
    pub screenshot_path: Option<String>,
}

impl JobReport {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            chat_id: job.chat_id.clone(),
            status: job.status,
            result_url: job.result_url.clone(),
            error: job.error.clone(),
            added: Vec::new(),
            failed: Vec::new(),
            screenshot_path: job.screenshot_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_short_hex() {
        let id = JobId::new();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn quantity_is_clamped() {
        assert_eq!(Item::new("milk", 0).quantity, 1);
        assert_eq!(Item::new("milk", -4).quantity, 1);
        assert_eq!(Item::new("milk", 3).quantity, 3);
    }

    #[test]
    fn label_prefixes_brand() {
        let item = Item::new("milk", 1).with_brand("Lactantia");
        assert_eq!(item.label(), "Lactantia milk");
        assert_eq!(Item::new("eggs", 1).label(), "eggs");
    }

    #[test]
    fn state_machine_edges() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(NeedsUser));
        assert!(NeedsUser.can_transition_to(Pending));
        assert!(!Done.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!NeedsUser.can_transition_to(Done));
    }

    #[test]
    fn transition_rejects_illegal_edge() {
        let mut job = Job::new(ChatId::new("42"));
        job.transition(JobStatus::Running).unwrap();
        job.transition(JobStatus::Done).unwrap();
        let err = job.transition(JobStatus::Running).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidTransition {
                from: JobStatus::Done,
                to: JobStatus::Running
            }
        );
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::NeedsUser,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn outcome_and_then_short_circuits_challenge() {
        let out: Outcome<u32> = Outcome::Challenge("captcha".into());
        let chained = out.and_then(|v| Outcome::Success(v + 1));
        assert_eq!(chained, Outcome::Challenge("captcha".into()));
    }
}
