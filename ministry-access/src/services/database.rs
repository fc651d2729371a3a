//! MongoDB backend for [`DocumentStore`].
//!
//! Documents are stored flattened next to `_id` and `_version`. The
//! conditional replace filters on both, so a stale writer matches nothing.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client as MongoClient, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};

use crate::models::{Event, InviteCode, UserProfile};

use super::document_store::{Document, DocumentStore, Versioned};
use super::error::StoreError;

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            StoreError::Database(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), StoreError> {
        tracing::info!("Creating MongoDB indexes for ministry-access");

        self.create_index::<InviteCode>("role", "role_idx").await?;
        self.create_index::<Event>("organizer_id", "organizer_id_idx").await?;
        self.create_index::<Event>("starts_at", "starts_at_idx").await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    async fn create_index<T: Document>(&self, field: &str, name: &str) -> Result<(), StoreError> {
        let mut keys = mongodb::bson::Document::new();
        keys.insert(field, 1);
        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().name(name.to_string()).build())
            .build();

        self.db
            .collection::<mongodb::bson::Document>(T::COLLECTION)
            .create_index(index, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = T::COLLECTION, "Failed to create {} index: {}", name, e);
                StoreError::Database(e)
            })?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                StoreError::Database(e)
            })?;
        Ok(())
    }

    pub fn store<T: Document>(&self) -> MongoStore<T> {
        MongoStore::new(&self.db)
    }

    pub fn invite_codes(&self) -> MongoStore<InviteCode> {
        self.store()
    }

    pub fn events(&self) -> MongoStore<Event> {
        self.store()
    }

    pub fn users(&self) -> MongoStore<UserProfile> {
        self.store()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument<T> {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version")]
    version: i64,
    #[serde(flatten)]
    body: T,
}

pub struct MongoStore<T> {
    collection: Collection<StoredDocument<T>>,
}

impl<T: Document> MongoStore<T> {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(T::COLLECTION),
        }
    }

    fn stored(version: u64, document: &T) -> Result<StoredDocument<T>, StoreError> {
        let version = i64::try_from(version)
            .map_err(|_| StoreError::Internal(anyhow::anyhow!("Document version overflow")))?;
        Ok(StoredDocument {
            id: document.document_id().to_string(),
            version,
            body: document.clone(),
        })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl<T: Document> DocumentStore<T> for MongoStore<T> {
    async fn get(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError> {
        let found = self
            .collection
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = T::COLLECTION, document_id = %id, "Failed to read document: {}", e);
                StoreError::Database(e)
            })?;

        Ok(found.map(|stored| Versioned {
            version: stored.version.max(0) as u64,
            document: stored.body,
        }))
    }

    async fn insert(&self, document: &T) -> Result<bool, StoreError> {
        let stored = Self::stored(1, document)?;
        match self.collection.insert_one(&stored, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => {
                tracing::error!(collection = T::COLLECTION, "Failed to insert document: {}", e);
                Err(StoreError::Database(e))
            }
        }
    }

    async fn replace_if_version(
        &self,
        id: &str,
        expected_version: u64,
        document: &T,
    ) -> Result<bool, StoreError> {
        let next = Self::stored(expected_version + 1, document)?;
        let expected = next.version - 1;
        let result = self
            .collection
            .replace_one(doc! { "_id": id, "_version": expected }, &next, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = T::COLLECTION, document_id = %id, "Failed to replace document: {}", e);
                StoreError::Database(e)
            })?;

        Ok(result.matched_count == 1)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = T::COLLECTION, document_id = %id, "Failed to delete document: {}", e);
                StoreError::Database(e)
            })?;

        Ok(result.deleted_count == 1)
    }

    async fn list(&self) -> Result<Vec<T>, StoreError> {
        let cursor = self.collection.find(None, None).await.map_err(|e| {
            tracing::error!(collection = T::COLLECTION, "Failed to list documents: {}", e);
            StoreError::Database(e)
        })?;

        let stored: Vec<StoredDocument<T>> = cursor.try_collect().await?;
        Ok(stored.into_iter().map(|s| s.body).collect())
    }
}
