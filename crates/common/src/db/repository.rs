//! Repository pattern for database operations
//!
//! Documents are append-only: the repository inserts and reads, nothing
//! updates or deletes.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set,
};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Store an extraction result; `created_at` is stamped at insert time
    pub async fn create_document(
        &self,
        filename: String,
        extracted_data: String,
    ) -> Result<Document> {
        let document = DocumentActiveModel {
            filename: Set(filename),
            extracted_data: Set(extracted_data),
            created_at: Set(chrono::Utc::now().into()),
            ..Default::default()
        };

        document.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find document by ID
    pub async fn find_document_by_id(&self, id: i32) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// List documents newest first, with the total count
    pub async fn list_documents(&self, offset: u64, limit: u64) -> Result<(Vec<Document>, u64)> {
        let total = self.count_documents().await?;

        let documents = DocumentEntity::find()
            .order_by_desc(DocumentColumn::CreatedAt)
            .order_by_desc(DocumentColumn::Id)
            .offset(offset)
            .limit(limit)
            .all(self.conn())
            .await?;

        Ok((documents, total))
    }

    /// Count stored documents
    pub async fn count_documents(&self) -> Result<u64> {
        DocumentEntity::find()
            .count(self.conn())
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    async fn repository() -> Repository {
        let pool = DbPool::new(&DatabaseConfig::in_memory()).await.unwrap();
        pool.ensure_schema().await.unwrap();
        Repository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_find_document() {
        let repo = repository().await;

        let created = repo
            .create_document("claim.jpg".into(), r#"{"fields":{}}"#.into())
            .await
            .unwrap();
        assert!(created.id > 0);
        assert_eq!(created.filename, "claim.jpg");

        let found = repo.find_document_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.extracted_data, r#"{"fields":{}}"#);
        assert_eq!(found.extracted_json(), serde_json::json!({"fields": {}}));

        assert!(repo.find_document_by_id(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ids_increase_per_insert() {
        let repo = repository().await;
        let first = repo.create_document("a.jpg".into(), "{}".into()).await.unwrap();
        let second = repo.create_document("b.jpg".into(), "{}".into()).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(repo.count_documents().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_documents_newest_first() {
        let repo = repository().await;
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            repo.create_document(name.into(), "{}".into()).await.unwrap();
        }

        let (page, total) = repo.list_documents(0, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            page.iter().map(|d| d.filename.as_str()).collect::<Vec<_>>(),
            vec!["c.jpg", "b.jpg"]
        );

        let (rest, _) = repo.list_documents(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].filename, "a.jpg");
    }

    #[test]
    fn test_extracted_json_falls_back_to_string() {
        let document = Document {
            id: 1,
            filename: "x.jpg".into(),
            extracted_data: "not json".into(),
            created_at: chrono::Utc::now().into(),
        };
        assert_eq!(document.extracted_json(), serde_json::json!("not json"));
    }
}
