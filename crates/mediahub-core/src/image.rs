//! The image entity the use-case hands back to its caller.
//!
//! Persistence to a relational metadata store is an external collaborator;
//! fields that only the store can assign (`id`, timestamps) are left at
//! their zero value here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub width: i32,
    pub height: i32,
    pub project: String,
    pub size: i64,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webp_key: Option<String>,
    pub mime_type: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub order_index: i32,
}
