//! MongoDB implementation of DocumentBackend

use std::time::Duration;

use async_trait::async_trait;
use core_config::MongoConfig;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, IndexOptions},
    Client, Database, IndexModel,
};
use tracing::{info, instrument};

use crate::backend::{DocumentBackend, Snapshot};
use crate::error::{StoreError, StoreResult};
use crate::query::Filter;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB backend; one database, any number of collections
#[derive(Clone, Debug)]
pub struct MongoBackend {
    db: Database,
}

impl MongoBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect using a MongoConfig and verify the server answers a ping
    pub async fn connect(config: &MongoConfig) -> StoreResult<Self> {
        info!(database = %config.database, "Connecting to MongoDB");

        let mut options = ClientOptions::parse(&config.url).await?;
        options.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));
        options.server_selection_timeout =
            Some(Duration::from_secs(config.server_selection_timeout_secs));

        if let Some(ref app_name) = config.app_name {
            options.app_name = Some(app_name.clone());
        }

        let client = Client::with_options(options)?;
        let db = client.database(&config.database);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Unavailable(format!("ping failed: {}", e)))?;

        info!("Successfully connected to MongoDB");
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

/// Ids generated by the server are ObjectIds; anything else is matched as text
fn id_filter(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { "_id": oid },
        Err(_) => doc! { "_id": id },
    }
}

fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn into_snapshot(mut doc: Document) -> Snapshot {
    let id = doc.remove("_id").map(|id| id_to_string(&id)).unwrap_or_default();
    Snapshot { id, fields: doc }
}

#[async_trait]
impl DocumentBackend for MongoBackend {
    #[instrument(skip(self, fields))]
    async fn insert(&self, collection: &str, fields: Document) -> StoreResult<String> {
        let result = self.collection(collection).insert_one(fields).await?;
        Ok(id_to_string(&result.inserted_id))
    }

    #[instrument(skip(self))]
    async fn fetch(&self, collection: &str, id: &str) -> StoreResult<Option<Snapshot>> {
        let doc = self.collection(collection).find_one(id_filter(id)).await?;
        Ok(doc.map(into_snapshot))
    }

    #[instrument(skip(self, fields))]
    async fn merge(&self, collection: &str, id: &str, fields: Document) -> StoreResult<bool> {
        let result = self
            .collection(collection)
            .update_one(id_filter(id), doc! { "$set": fields })
            .await?;
        Ok(result.matched_count > 0)
    }

    #[instrument(skip(self))]
    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.collection(collection).delete_one(id_filter(id)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Snapshot>> {
        let mut options = FindOptions::default();
        options.sort = filter.sort_document();
        options.limit = filter.limit.map(|l| l as i64);

        let cursor = self
            .collection(collection)
            .find(filter.to_document())
            .with_options(options)
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;

        Ok(docs.into_iter().map(into_snapshot).collect())
    }

    #[instrument(skip(self))]
    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);

        let index = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name(format!("idx_{}_unique", field))
                    .build(),
            )
            .build();

        self.collection(collection).create_index(index).await?;
        info!(collection, field, "Unique index ensured");
        Ok(())
    }
}

/// Map a driver error onto the store's error kinds
pub(crate) fn classify_error(err: MongoError) -> StoreError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY_CODE => {
            Some(e.message.clone())
        }
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY_CODE => Some(e.message.clone()),
        _ => None,
    };

    match duplicate {
        Some(message) => {
            let (field, value) = parse_duplicate_key(&message);
            StoreError::DuplicateKey { field, value }
        }
        None => StoreError::Unavailable(err.to_string()),
    }
}

/// Extract field and value from a server message such as
/// `E11000 duplicate key error collection: db.products index: idx_code_unique dup key: { code: "A1" }`
fn parse_duplicate_key(message: &str) -> (String, String) {
    let key = message
        .split_once("dup key:")
        .map(|(_, rest)| rest.trim().trim_start_matches('{').trim_end_matches('}'))
        .and_then(|inner| inner.split_once(':'))
        .map(|(field, value)| {
            (
                field.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            )
        });

    key.unwrap_or_else(|| {
        let field = message
            .split_once("index: idx_")
            .and_then(|(_, rest)| rest.split_once("_unique"))
            .map(|(field, _)| field.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        (field, String::new())
    })
}
