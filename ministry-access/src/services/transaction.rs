//! Single-document read-modify-write on top of [`DocumentStore`].
//!
//! The body closure sees the current document and decides what to write.
//! The write is conditioned on the version that was read; if another writer
//! committed in between, the body runs again against fresh state. This
//! mirrors the retry a transactional document store performs internally.
//! Once the attempt budget is spent the failure is returned to the caller as
//! retryable; nothing above this layer retries on its own.

use super::document_store::{Document, DocumentStore};
use super::error::StoreError;

/// Retry budget for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionPolicy {
    pub max_attempts: u32,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// What the transaction body wants persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Commit<T> {
    Unchanged,
    Write(T),
}

/// Run `body` as an atomic read-modify-write of document `id`.
///
/// `body` receives `None` when the document does not exist; writing in that
/// case creates it. Errors returned by `body` abort without writing.
pub async fn run_transaction<T, R, E, F>(
    store: &dyn DocumentStore<T>,
    id: &str,
    policy: TransactionPolicy,
    mut body: F,
) -> Result<R, E>
where
    T: Document,
    E: From<StoreError>,
    F: FnMut(Option<T>) -> Result<(Commit<T>, R), E>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        let current = store.get(id).await?;
        let read_version = current.as_ref().map(|v| v.version);

        let (commit, outcome) = body(current.map(|v| v.document))?;
        let next = match commit {
            Commit::Unchanged => return Ok(outcome),
            Commit::Write(next) => next,
        };

        let committed = match read_version {
            Some(version) => store.replace_if_version(id, version, &next).await?,
            None => store.insert(&next).await?,
        };
        if committed {
            return Ok(outcome);
        }

        metrics::counter!("store_transaction_conflicts_total", "collection" => T::COLLECTION)
            .increment(1);
        tracing::debug!(
            collection = T::COLLECTION,
            document_id = %id,
            attempt,
            "Write lost to a concurrent transaction, re-reading"
        );
    }

    tracing::warn!(
        collection = T::COLLECTION,
        document_id = %id,
        attempts,
        "Transaction abandoned after repeated conflicts"
    );
    Err(StoreError::Contention {
        collection: T::COLLECTION,
        id: id.to_string(),
        attempts,
    }
    .into())
}
