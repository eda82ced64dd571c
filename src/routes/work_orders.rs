use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, ROLE_TECHNICIAN, ROLE_TENANT};
use crate::error::{AppError, AppResult};
use crate::models::{User, WorkOrder};
use crate::state::AppState;
use crate::work_orders::{
    self, attachment_key, CreateWorkOrder, NoteEntry, WorkOrderPatch,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitterResponse {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderResponse {
    pub id: Uuid,
    pub work_order_id: i32,
    pub task_type: String,
    pub room_number: String,
    pub details: String,
    pub notes_history: Vec<NoteEntry>,
    pub created_date: String,
    pub modified_date: String,
    pub submitted_by: Option<SubmitterResponse>,
    pub priority: String,
    pub attachments: Vec<String>,
    pub status: String,
    pub age: i64,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct AttachmentsResponse {
    pub message: &'static str,
    pub attachments: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkOrderRequest {
    pub task_type: Option<String>,
    pub room_number: Option<String>,
    pub details: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub notes_history: Option<Vec<NoteEntry>>,
}

#[derive(Deserialize)]
pub struct AddNoteRequest {
    pub note: Option<String>,
}

fn format_timestamp(value: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(value, Utc).to_rfc3339()
}

fn to_response(order: WorkOrder, submitter: Option<User>) -> AppResult<WorkOrderResponse> {
    let notes = work_orders::notes_of(&order)?;
    let age = work_orders::age_in_days(order.created_date, Utc::now().naive_utc());

    Ok(WorkOrderResponse {
        id: order.id,
        work_order_id: order.work_order_id,
        task_type: order.task_type,
        room_number: order.room_number,
        details: order.details,
        notes_history: notes,
        created_date: format_timestamp(order.created_date),
        modified_date: format_timestamp(order.modified_date),
        submitted_by: submitter.map(|user| SubmitterResponse {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
        }),
        priority: order.priority,
        attachments: order.attachments,
        status: order.status,
        age,
    })
}

fn load_submitter(
    conn: &mut diesel::PgConnection,
    submitted_by: Uuid,
) -> AppResult<Option<User>> {
    use crate::schema::users;
    use diesel::prelude::*;

    Ok(users::table
        .find(submitted_by)
        .first::<User>(conn)
        .optional()?)
}

pub async fn list_work_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<WorkOrderResponse>>> {
    user.require_role(&[ROLE_TECHNICIAN, ROLE_TENANT])?;
    let mut conn = state.db()?;

    let rows = work_orders::list(&mut conn)?;
    let mut response = Vec::with_capacity(rows.len());
    for (order, submitter) in rows {
        response.push(to_response(order, submitter)?);
    }

    Ok(Json(response))
}

pub async fn count_work_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<CountResponse>> {
    user.require_role(&[ROLE_TECHNICIAN, ROLE_TENANT])?;
    let mut conn = state.db()?;
    let count = work_orders::count(&mut conn)?;
    Ok(Json(CountResponse { count }))
}

/// Multipart create: text fields `taskType`, `roomNumber`, `details`,
/// `priority` plus an optional single file field `attachments`. The blob is
/// stored before the record so metadata never references a missing blob.
pub async fn create_work_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<WorkOrderResponse>)> {
    user.require_role(&[ROLE_TECHNICIAN, ROLE_TENANT])?;

    let mut task_type = String::new();
    let mut room_number = String::new();
    let mut details = String::new();
    let mut priority: Option<String> = None;
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("taskType") => task_type = read_text_field(field, "taskType").await?,
            Some("roomNumber") => room_number = read_text_field(field, "roomNumber").await?,
            Some("details") => details = read_text_field(field, "details").await?,
            Some("priority") => priority = Some(read_text_field(field, "priority").await?),
            Some("attachments") => {
                if let Some(part) = read_file_field(field).await? {
                    file = Some(part);
                }
            }
            _ => {}
        }
    }

    let attachment = match file {
        Some((original_name, content_type, bytes)) => {
            let key = attachment_key(&original_name);
            state
                .storage
                .put_object(&key, bytes, content_type)
                .await
                .map_err(|err| {
                    error!(error = %err, key, "attachment upload failed");
                    AppError::internal(format!("failed to store attachment: {err}"))
                })?;
            Some(key)
        }
        None => None,
    };

    let mut conn = state.db()?;
    let order = work_orders::create(
        &mut conn,
        CreateWorkOrder {
            task_type,
            room_number,
            details,
            priority,
            submitted_by: user.user_id,
            attachment,
        },
    )?;
    info!(
        work_order_id = order.work_order_id,
        task_type = %order.task_type,
        "work order created"
    );

    let submitter = load_submitter(&mut conn, order.submitted_by)?;
    Ok((StatusCode::CREATED, Json(to_response(order, submitter)?)))
}

pub async fn update_work_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateWorkOrderRequest>,
) -> AppResult<Json<WorkOrderResponse>> {
    user.require_role(&[ROLE_TECHNICIAN, ROLE_TENANT])?;
    let mut conn = state.db()?;

    let order = work_orders::update(
        &mut conn,
        id,
        WorkOrderPatch {
            task_type: payload.task_type,
            room_number: payload.room_number,
            details: payload.details,
            priority: payload.priority,
            status: payload.status,
            notes_history: payload.notes_history,
        },
    )?;

    let submitter = load_submitter(&mut conn, order.submitted_by)?;
    Ok(Json(to_response(order, submitter)?))
}

pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<AddNoteRequest>,
) -> AppResult<Json<WorkOrderResponse>> {
    user.require_role(&[ROLE_TECHNICIAN, ROLE_TENANT])?;
    let mut conn = state.db()?;

    let note = payload.note.unwrap_or_default();
    let order = work_orders::add_note(&mut conn, id, &note, user.user_id)?;

    let submitter = load_submitter(&mut conn, order.submitted_by)?;
    Ok(Json(to_response(order, submitter)?))
}

pub async fn delete_work_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<MessageResponse>> {
    user.require_role(&[ROLE_TECHNICIAN, ROLE_TENANT])?;
    let mut conn = state.db()?;

    let orphaned = work_orders::delete(&mut conn, id)?;
    drop(conn);

    // The record is already gone; blob cleanup is best-effort only.
    for key in orphaned {
        if let Err(err) = state.storage.delete_object(&key).await {
            warn!(error = %err, key, "failed to delete attachment blob");
        }
    }

    Ok(Json(MessageResponse {
        message: "Work order deleted",
    }))
}

/// Multipart field `files`, repeated. Every blob must store successfully
/// before any path is recorded on the work order.
pub async fn add_attachments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<AttachmentsResponse>> {
    user.require_role(&[ROLE_TECHNICIAN, ROLE_TENANT])?;

    {
        let mut conn = state.db()?;
        work_orders::find(&mut conn, id)?;
    }

    let mut files: Vec<(String, Option<String>, Vec<u8>)> = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() == Some("files") {
            if let Some(part) = read_file_field(field).await? {
                files.push(part);
            }
        }
    }

    let mut keys = Vec::with_capacity(files.len());
    for (original_name, content_type, bytes) in files {
        let key = attachment_key(&original_name);
        state
            .storage
            .put_object(&key, bytes, content_type)
            .await
            .map_err(|err| {
                error!(error = %err, key, "attachment upload failed");
                AppError::internal(format!("failed to store attachment: {err}"))
            })?;
        keys.push(key);
    }

    let mut conn = state.db()?;
    let order = work_orders::add_attachments(&mut conn, id, keys)?;

    Ok(Json(AttachmentsResponse {
        message: "Files uploaded successfully",
        attachments: order.attachments,
    }))
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    Path((id, filename)): Path<(Uuid, String)>,
    user: AuthenticatedUser,
) -> AppResult<Json<AttachmentsResponse>> {
    user.require_role(&[ROLE_TECHNICIAN, ROLE_TENANT])?;
    let mut conn = state.db()?;

    let (order, removed) = work_orders::delete_attachment(&mut conn, id, &filename)?;
    drop(conn);

    // Metadata is authoritative; a failed blob delete is logged and swallowed.
    for key in removed {
        if let Err(err) = state.storage.delete_object(&key).await {
            warn!(error = %err, key, "failed to delete attachment blob");
        }
    }

    Ok(Json(AttachmentsResponse {
        message: "Attachment deleted successfully",
        attachments: order.attachments,
    }))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>, name: &str) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid {name}: {err}")))
}

async fn read_file_field(
    field: axum::extract::multipart::Field<'_>,
) -> AppResult<Option<(String, Option<String>, Vec<u8>)>> {
    let original_name = match field.file_name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Ok(None),
    };
    let content_type = field.content_type().map(|mime| mime.to_string());
    let bytes = field
        .bytes()
        .await
        .map_err(|err| AppError::bad_request(format!("failed to read file bytes: {err}")))?;
    Ok(Some((original_name, content_type, bytes.to_vec())))
}
