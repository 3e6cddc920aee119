use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectOptions, Database, QuerySelect};
use std::time::Duration;

use crate::backend::{StorageBackend, StorageError};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "storage")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub namespace: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    #[sea_orm(column_type = "Text")]
    pub value: String,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Relational reference backend. Expects a table created by:
///
/// ```sql
/// CREATE TABLE storage (
///     namespace  TEXT NOT NULL,
///     key        TEXT NOT NULL,
///     value      TEXT NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL,
///     PRIMARY KEY (namespace, key)
/// );
/// ```
pub struct PostgresBackend {
    db: DatabaseConnection,
}

impl PostgresBackend {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(100)
            .min_connections(5)
            .connect_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(300));
        let db = Database::connect(opt)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<(), StorageError> {
        let existing = Entity::find_by_id((namespace.to_string(), key.to_string()))
            .one(&self.db)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let now = chrono::Utc::now().into();
        let model = ActiveModel {
            namespace: ActiveValue::Set(namespace.to_string()),
            key: ActiveValue::Set(key.to_string()),
            value: ActiveValue::Set(value),
            updated_at: ActiveValue::Set(now),
        };

        if existing.is_some() {
            model
                .update(&self.db)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        } else {
            model
                .insert(&self.db)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        let row = Entity::find_by_id((namespace.to_string(), key.to_string()))
            .one(&self.db)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.map(|m| m.value))
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        Entity::delete_by_id((namespace.to_string(), key.to_string()))
            .exec(&self.db)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let rows = Entity::find()
            .filter(Column::Namespace.eq(namespace))
            .select_only()
            .column(Column::Key)
            .into_tuple::<String>()
            .all(&self.db)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows)
    }

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<(String, String, String)>, StorageError> {
        let rows = Entity::find()
            .all(&self.db)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|m| (m.namespace, m.key, m.value))
            .collect())
    }
}
