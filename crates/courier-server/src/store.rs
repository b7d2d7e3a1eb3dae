//! MongoDB-backed user store.

use crate::config::StoreConfig;
use anyhow::Result;
use async_trait::async_trait;
use courier_core::{NullUserStore, StoreError, UserStore};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::{ClientOptions, UpdateOptions};
use mongodb::{Client, Collection};
use std::sync::Arc;
use tracing::{debug, info};

/// Writes `lastSeen` onto documents of the users collection.
pub struct MongoUserStore {
    users: Collection<Document>,
    _client: Client,
}

impl MongoUserStore {
    /// Connect using `config`. Returns `None` when no URI is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI cannot be parsed or the client cannot be built.
    pub async fn new(config: &StoreConfig) -> Result<Option<Self>> {
        let Some(uri) = &config.mongodb_uri else {
            return Ok(None);
        };

        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;
        let users = client
            .database(&config.database)
            .collection::<Document>(&config.users_collection);

        info!(
            database = %config.database,
            collection = %config.users_collection,
            "MongoDB user store ready"
        );
        Ok(Some(Self {
            users,
            _client: client,
        }))
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn update_last_seen(&self, user_id: &str, last_seen: u64) -> Result<(), StoreError> {
        let id = ObjectId::parse_str(user_id)
            .map_err(|_| StoreError::InvalidUserId(user_id.to_string()))?;
        let millis = i64::try_from(last_seen).unwrap_or(i64::MAX);

        let filter = doc! {"_id": id};
        let update = doc! {"$set": {"lastSeen": DateTime::from_millis(millis)}};

        let result = self
            .users
            .update_one(filter, update, None::<UpdateOptions>)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(user = %user_id, matched = result.matched_count, "Updated lastSeen");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mongodb"
    }
}

/// Pick the store for this configuration.
///
/// # Errors
///
/// Returns an error if a MongoDB URI is configured but unusable.
pub async fn from_config(config: &StoreConfig) -> Result<Arc<dyn UserStore>> {
    Ok(match MongoUserStore::new(config).await? {
        Some(store) => Arc::new(store),
        None => {
            info!("No MongoDB URI configured, last-seen times will not be persisted");
            Arc::new(NullUserStore)
        }
    })
}
