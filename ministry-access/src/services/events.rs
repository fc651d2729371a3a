//! Organizer-facing event CRUD and read-side queries.
//!
//! Detail edits are last-writer-wins and never touch the attendee or
//! waiting lists; those belong to [`RegistrationCoordinator`].

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::models::{Event, EventDetails, EventFilter, EventPatch, UserSession};

use super::document_store::DocumentStore;
use super::error::{AccessError, StoreError};
use super::policy::{Capability, RoleEscalationPolicy};
use super::registration::RegistrationCoordinator;
use super::session::SessionStore;
use super::transaction::{run_transaction, Commit, TransactionPolicy};

pub struct EventRegistry {
    events: Arc<dyn DocumentStore<Event>>,
    sessions: Arc<SessionStore>,
    registrations: Arc<RegistrationCoordinator>,
    policy: TransactionPolicy,
}

/// Organizers manage their own events; anyone else needs `ManageAnyEvent`.
fn authorize_manage(session: &UserSession, event: &Event) -> Result<(), AccessError> {
    let capability = if event.organizer_id == session.user_id() {
        Capability::ManageOwnEvents
    } else {
        Capability::ManageAnyEvent
    };
    RoleEscalationPolicy::require(session.role, capability)
}

impl EventRegistry {
    pub fn new(
        events: Arc<dyn DocumentStore<Event>>,
        sessions: Arc<SessionStore>,
        registrations: Arc<RegistrationCoordinator>,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            events,
            sessions,
            registrations,
            policy,
        }
    }

    #[instrument(skip(self, details), fields(title = %details.title))]
    pub async fn create_event(&self, details: EventDetails) -> Result<Event, AccessError> {
        let session = self
            .sessions
            .require_capability(Capability::CreateEvents)
            .await?;
        details.validate()?;

        let event = Event::new(details, session.user_id().to_string());
        if !self.events.insert(&event).await? {
            return Err(StoreError::Internal(anyhow::anyhow!(
                "Event id {} already exists",
                event.id
            ))
            .into());
        }

        tracing::info!(event_id = %event.id, "Event created");
        Ok(event)
    }

    /// Apply `patch` to the event details. A capacity below the current
    /// attendee count is rejected; a raised or removed cap seats waiters.
    #[instrument(skip(self, patch))]
    pub async fn update_event(&self, id: &str, patch: EventPatch) -> Result<Event, AccessError> {
        let session = self.sessions.require().await?;

        let (updated, seats_opened) =
            run_transaction(self.events.as_ref(), id, self.policy, |current| {
                let mut event = current.ok_or(AccessError::EventNotFound)?;
                authorize_manage(&session, &event)?;

                let mut details = event.details.clone();
                patch.apply_to(&mut details);
                details.validate()?;
                if let Some(max) = details.max_attendees {
                    if (max as usize) < event.attendees.len() {
                        return Err(AccessError::InvalidInput(format!(
                            "max_attendees {} is below the {} current attendees",
                            max,
                            event.attendees.len()
                        )));
                    }
                }

                let seats_opened = match (event.details.max_attendees, details.max_attendees) {
                    (Some(old), Some(new)) => new > old,
                    (Some(_), None) => true,
                    _ => false,
                };
                event.details = details;
                event.updated_at = Utc::now();
                Ok::<_, AccessError>((Commit::Write(event.clone()), (event, seats_opened)))
            })
            .await?;

        tracing::info!(event_id = %id, "Event updated");

        if seats_opened && !updated.waiting_list.is_empty() {
            self.registrations.fill_open_seats(id).await?;
            return Ok(self
                .events
                .get(id)
                .await?
                .map(|v| v.document)
                .unwrap_or(updated));
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_event(&self, id: &str) -> Result<(), AccessError> {
        let session = self.sessions.require().await?;
        let event = self.get_event(id).await?;
        authorize_manage(&session, &event)?;

        if !self.events.delete(id).await? {
            return Err(AccessError::EventNotFound);
        }
        tracing::info!(event_id = %id, "Event deleted");
        Ok(())
    }

    pub async fn get_event(&self, id: &str) -> Result<Event, AccessError> {
        self.events
            .get(id)
            .await?
            .map(|v| v.document)
            .ok_or(AccessError::EventNotFound)
    }

    /// Events matching `filter`, soonest first.
    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, AccessError> {
        let mut events: Vec<Event> = self
            .events
            .list()
            .await?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        events.sort_by(|a, b| a.details.starts_at.cmp(&b.details.starts_at));
        Ok(events)
    }

    /// Events `user_id` is seated at or waiting for, soonest first.
    pub async fn events_for_user(&self, user_id: &str) -> Result<Vec<Event>, AccessError> {
        let mut events: Vec<Event> = self
            .events
            .list()
            .await?
            .into_iter()
            .filter(|e| {
                e.attendees.iter().any(|a| a == user_id) || e.waiting_list.iter().any(|w| w == user_id)
            })
            .collect();
        events.sort_by(|a, b| a.details.starts_at.cmp(&b.details.starts_at));
        Ok(events)
    }
}
