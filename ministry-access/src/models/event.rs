//! Event model with its attendee list and FIFO waiting list.
//!
//! The roster methods here are pure; `RegistrationCoordinator` runs them
//! inside a document transaction so each call sees and writes one
//! consistent snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::services::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Worship,
    BibleStudy,
    Fellowship,
    Outreach,
    Conference,
    Other,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Worship => write!(f, "worship"),
            EventCategory::BibleStudy => write!(f, "bible_study"),
            EventCategory::Fellowship => write!(f, "fellowship"),
            EventCategory::Outreach => write!(f, "outreach"),
            EventCategory::Conference => write!(f, "conference"),
            EventCategory::Other => write!(f, "other"),
        }
    }
}

/// Organizer-editable fields. Membership lives outside this struct so
/// detail edits can never touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_schedule"))]
pub struct EventDetails {
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[validate(length(max = 4000))]
    #[serde(default)]
    pub description: String,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub location: String,
    pub category: EventCategory,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Unbounded when `None`.
    #[validate(range(min = 1))]
    #[serde(default)]
    pub max_attendees: Option<u32>,
    #[serde(default)]
    pub is_published: bool,
}

fn validate_schedule(details: &EventDetails) -> Result<(), ValidationError> {
    if details.ends_at <= details.starts_at {
        return Err(ValidationError::new("ends_at_before_starts_at"));
    }
    Ok(())
}

/// Partial update of [`EventDetails`]. `max_attendees: Some(None)` removes
/// the cap.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub category: Option<EventCategory>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_attendees: Option<Option<u32>>,
    pub is_published: Option<bool>,
}

impl EventPatch {
    pub fn apply_to(&self, details: &mut EventDetails) {
        if let Some(title) = &self.title {
            details.title = title.clone();
        }
        if let Some(description) = &self.description {
            details.description = description.clone();
        }
        if let Some(location) = &self.location {
            details.location = location.clone();
        }
        if let Some(category) = self.category {
            details.category = category;
        }
        if let Some(starts_at) = self.starts_at {
            details.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            details.ends_at = ends_at;
        }
        if let Some(max_attendees) = self.max_attendees {
            details.max_attendees = max_attendees;
        }
        if let Some(is_published) = self.is_published {
            details.is_published = is_published;
        }
    }
}

/// Result of an RSVP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    Registered,
    WaitingList,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Registered => "registered",
            RsvpStatus::WaitingList => "waiting_list",
        }
    }
}

/// Where a user currently stands for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RegistrationStatus {
    NotRegistered,
    Registered,
    /// 1-based position in the waiting list.
    WaitingList { position: usize },
}

/// Result of a cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Seat released; `promoted` is the waiter who took it, if any.
    Cancelled { promoted: Option<String> },
    LeftWaitingList,
    NotRegistered,
}

impl CancelOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelOutcome::Cancelled { .. } => "cancelled",
            CancelOutcome::LeftWaitingList => "left_waiting_list",
            CancelOutcome::NotRegistered => "not_registered",
        }
    }
}

/// Event entity, stored in `events` keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(flatten)]
    pub details: EventDetails,
    pub organizer_id: String,
    /// Registration order.
    #[serde(default)]
    pub attendees: Vec<String>,
    /// Oldest waiter first.
    #[serde(default)]
    pub waiting_list: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(details: EventDetails, organizer_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            details,
            organizer_id,
            attendees: Vec::new(),
            waiting_list: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_open_seat(&self) -> bool {
        self.details
            .max_attendees
            .map_or(true, |max| self.attendees.len() < max as usize)
    }

    pub fn status_of(&self, user_id: &str) -> RegistrationStatus {
        if self.attendees.iter().any(|id| id == user_id) {
            return RegistrationStatus::Registered;
        }
        match self.waiting_list.iter().position(|id| id == user_id) {
            Some(idx) => RegistrationStatus::WaitingList { position: idx + 1 },
            None => RegistrationStatus::NotRegistered,
        }
    }

    /// Seat `user_id` or queue them. Returns the resulting status and
    /// whether the roster changed; a user already present keeps their place.
    pub fn register(&mut self, user_id: &str) -> (RsvpStatus, bool) {
        match self.status_of(user_id) {
            RegistrationStatus::Registered => return (RsvpStatus::Registered, false),
            RegistrationStatus::WaitingList { .. } => return (RsvpStatus::WaitingList, false),
            RegistrationStatus::NotRegistered => {}
        }
        if self.has_open_seat() {
            self.attendees.push(user_id.to_string());
            (RsvpStatus::Registered, true)
        } else {
            self.waiting_list.push(user_id.to_string());
            (RsvpStatus::WaitingList, true)
        }
    }

    /// Remove `user_id` from whichever list holds them. Leaving the attendee
    /// list hands the seat to the head of the waiting list.
    pub fn withdraw(&mut self, user_id: &str) -> CancelOutcome {
        if let Some(idx) = self.attendees.iter().position(|id| id == user_id) {
            self.attendees.remove(idx);
            let promoted = self.fill_open_seats().into_iter().next();
            return CancelOutcome::Cancelled { promoted };
        }
        if let Some(idx) = self.waiting_list.iter().position(|id| id == user_id) {
            self.waiting_list.remove(idx);
            return CancelOutcome::LeftWaitingList;
        }
        CancelOutcome::NotRegistered
    }

    /// Move waiters into open seats, oldest first. Returns who moved.
    pub fn fill_open_seats(&mut self) -> Vec<String> {
        let mut promoted = Vec::new();
        while self.has_open_seat() && !self.waiting_list.is_empty() {
            let next = self.waiting_list.remove(0);
            self.attendees.push(next.clone());
            promoted.push(next);
        }
        promoted
    }

    /// Lists are disjoint, duplicate-free, and within capacity.
    pub fn roster_is_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        let unique = self
            .attendees
            .iter()
            .chain(self.waiting_list.iter())
            .all(|id| seen.insert(id.as_str()));
        let within_capacity = self
            .details
            .max_attendees
            .map_or(true, |max| self.attendees.len() <= max as usize);
        unique && within_capacity
    }
}

impl Document for Event {
    const COLLECTION: &'static str = "events";

    fn document_id(&self) -> &str {
        &self.id
    }
}

/// Read-side filter for listings; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub category: Option<EventCategory>,
    pub organizer_id: Option<String>,
    pub published_only: bool,
    /// Only events that have not ended by this instant.
    pub upcoming_after: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.category.map_or(true, |c| c == event.details.category)
            && self
                .organizer_id
                .as_deref()
                .map_or(true, |o| o == event.organizer_id)
            && (!self.published_only || event.details.is_published)
            && self
                .upcoming_after
                .map_or(true, |t| event.details.ends_at > t)
    }
}
