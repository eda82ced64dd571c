use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A maintenance work order. `work_order_id` is the public 9-digit identifier,
/// assigned once at creation and never reused; `id` is the internal key.
/// `submitted_by` is a weak reference: the user row may no longer exist.
#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = work_orders)]
pub struct WorkOrder {
    pub id: Uuid,
    pub work_order_id: i32,
    pub task_type: String,
    pub room_number: String,
    pub details: String,
    pub notes_history: serde_json::Value,
    pub created_date: NaiveDateTime,
    pub modified_date: NaiveDateTime,
    pub submitted_by: Uuid,
    pub priority: String,
    pub attachments: Vec<String>,
    pub status: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = work_orders)]
pub struct NewWorkOrder {
    pub id: Uuid,
    pub work_order_id: i32,
    pub task_type: String,
    pub room_number: String,
    pub details: String,
    pub notes_history: serde_json::Value,
    pub submitted_by: Uuid,
    pub priority: String,
    pub attachments: Vec<String>,
    pub status: String,
}
