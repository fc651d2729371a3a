//! Attendee and waiting-list mutations for one event.
//!
//! Every mutation is one transaction on the event document, so concurrent
//! RSVPs for the last seat resolve to one seat and one waiter.

use std::sync::Arc;
use tracing::instrument;

use crate::models::{CancelOutcome, Event, RegistrationStatus, RsvpStatus};

use super::document_store::DocumentStore;
use super::error::AccessError;
use super::transaction::{run_transaction, Commit, TransactionPolicy};

pub struct RegistrationCoordinator {
    events: Arc<dyn DocumentStore<Event>>,
    policy: TransactionPolicy,
}

impl RegistrationCoordinator {
    pub fn new(events: Arc<dyn DocumentStore<Event>>, policy: TransactionPolicy) -> Self {
        Self { events, policy }
    }

    /// Seat `user_id` or put them at the back of the waiting list. A user
    /// already on either list keeps their place.
    #[instrument(skip(self))]
    pub async fn rsvp(&self, event_id: &str, user_id: &str) -> Result<RsvpStatus, AccessError> {
        let result = run_transaction(self.events.as_ref(), event_id, self.policy, |current| {
            let mut event = current.ok_or(AccessError::EventNotFound)?;
            let (status, changed) = event.register(user_id);
            if !changed {
                return Ok((Commit::Unchanged, (status, false)));
            }
            event.updated_at = chrono::Utc::now();
            Ok::<_, AccessError>((Commit::Write(event), (status, true)))
        })
        .await;

        let outcome = match &result {
            Ok((status, true)) => status.as_str(),
            Ok((_, false)) => "unchanged",
            Err(AccessError::EventNotFound) => "not_found",
            Err(_) => "error",
        };
        metrics::counter!("event_rsvp_total", "outcome" => outcome).increment(1);

        let (status, changed) = result?;
        if changed {
            tracing::info!(status = status.as_str(), "RSVP recorded");
        }
        Ok(status)
    }

    /// Remove `user_id` from the event. A freed seat goes to the oldest
    /// waiter. Unknown users are a no-op.
    #[instrument(skip(self))]
    pub async fn cancel(&self, event_id: &str, user_id: &str) -> Result<CancelOutcome, AccessError> {
        let result = run_transaction(self.events.as_ref(), event_id, self.policy, |current| {
            let mut event = current.ok_or(AccessError::EventNotFound)?;
            let outcome = event.withdraw(user_id);
            if outcome == CancelOutcome::NotRegistered {
                return Ok((Commit::Unchanged, outcome));
            }
            event.updated_at = chrono::Utc::now();
            Ok::<_, AccessError>((Commit::Write(event), outcome))
        })
        .await;

        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(AccessError::EventNotFound) => "not_found",
            Err(_) => "error",
        };
        metrics::counter!("event_cancel_total", "outcome" => label).increment(1);

        let outcome = result?;
        if let CancelOutcome::Cancelled {
            promoted: Some(promoted),
        } = &outcome
        {
            tracing::info!(promoted = %promoted, "Waiting list head promoted into freed seat");
        }
        Ok(outcome)
    }

    /// Move waiters into any open seats, oldest first. Returns who moved.
    #[instrument(skip(self))]
    pub async fn fill_open_seats(&self, event_id: &str) -> Result<Vec<String>, AccessError> {
        let promoted = run_transaction(self.events.as_ref(), event_id, self.policy, |current| {
            let mut event = current.ok_or(AccessError::EventNotFound)?;
            let promoted = event.fill_open_seats();
            if promoted.is_empty() {
                return Ok((Commit::Unchanged, promoted));
            }
            event.updated_at = chrono::Utc::now();
            Ok::<_, AccessError>((Commit::Write(event), promoted))
        })
        .await?;

        if !promoted.is_empty() {
            tracing::info!(count = promoted.len(), "Promoted waiters into open seats");
        }
        Ok(promoted)
    }

    /// Read-only and possibly stale.
    pub async fn status(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<RegistrationStatus, AccessError> {
        let event = self
            .events
            .get(event_id)
            .await?
            .ok_or(AccessError::EventNotFound)?;
        Ok(event.document.status_of(user_id))
    }
}
