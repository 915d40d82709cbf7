//! Document entity
//!
//! One row per successful upload. Rows are only ever inserted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Filename as sent by the client
    pub filename: String,

    /// Extraction result serialized as JSON text
    #[sea_orm(column_type = "Text")]
    pub extracted_data: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse `extracted_data` back into JSON, falling back to the raw string
    pub fn extracted_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.extracted_data)
            .unwrap_or_else(|_| serde_json::Value::String(self.extracted_data.clone()))
    }
}
