//! Work order store: identifier allocation, validation, note history and
//! attachment bookkeeping, and the status/priority lifecycle. Route handlers
//! stay thin; every mutation goes through here.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::{prelude::*, result::DatabaseErrorKind, select, PgConnection};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewWorkOrder, User, WorkOrder};
use crate::schema::{users, work_orders};

pub const TASK_TYPES: &[&str] = &[
    "Clean Up / Spill",
    "Cooling Issue",
    "Electrical Issue",
    "Equipment Repairs",
    "Fire Safety",
    "General Maintenance Request",
    "Health and Safety",
    "Heating Issues",
    "Lighting Issues",
    "Mechanical Issues",
    "Painting / Touch Ups",
    "Pest Control",
    "Plumbing Issues",
    "Waste Issues",
];

pub const PRIORITIES: &[&str] = &["Low", "Medium", "High", "Emergency"];

pub const STATUSES: &[&str] = &["new", "pending", "delayed", "closed", "excluded", "re-opened"];

pub const DEFAULT_PRIORITY: &str = "Low";
pub const DEFAULT_STATUS: &str = "new";

const WORK_ORDER_ID_MIN: i32 = 100_000_000;
const WORK_ORDER_ID_MAX: i32 = 999_999_999;

/// Allocation is generate-check-commit with the unique index as final arbiter,
/// so a cap keeps an adversarial collision density from looping forever.
const MAX_ID_ALLOCATION_ATTEMPTS: u32 = 10;

/// One entry of a work order's append-only note history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEntry {
    pub note: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CreateWorkOrder {
    pub task_type: String,
    pub room_number: String,
    pub details: String,
    pub priority: Option<String>,
    pub submitted_by: Uuid,
    pub attachment: Option<String>,
}

/// Partial update; unset fields are left untouched. `notes_history` replaces
/// the whole list (delete-note-by-index is expressed through this).
#[derive(Debug, Default)]
pub struct WorkOrderPatch {
    pub task_type: Option<String>,
    pub room_number: Option<String>,
    pub details: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub notes_history: Option<Vec<NoteEntry>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = work_orders)]
struct WorkOrderChangeset<'a> {
    task_type: Option<&'a str>,
    room_number: Option<&'a str>,
    details: Option<&'a str>,
    priority: Option<&'a str>,
    status: Option<&'a str>,
    notes_history: Option<Value>,
    modified_date: NaiveDateTime,
}

fn random_work_order_id<R: Rng>(rng: &mut R) -> i32 {
    rng.gen_range(WORK_ORDER_ID_MIN..=WORK_ORDER_ID_MAX)
}

fn require_field(value: &str, name: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::bad_request(format!("{name} is required")));
    }
    Ok(())
}

fn require_member(value: &str, allowed: &[&str], name: &str) -> AppResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "invalid {name} '{value}'. Allowed values: {}",
            allowed.join(", ")
        )))
    }
}

fn parse_notes(value: &Value) -> AppResult<Vec<NoteEntry>> {
    serde_json::from_value(value.clone())
        .map_err(|err| AppError::internal(format!("corrupt notes history: {err}")))
}

pub fn notes_of(order: &WorkOrder) -> AppResult<Vec<NoteEntry>> {
    parse_notes(&order.notes_history)
}

/// Display-name snapshot stamped into note entries: `"First Last"` when both
/// names are set and non-empty, otherwise the login username.
pub fn display_name(user: &User) -> String {
    match (user.first_name.as_deref(), user.last_name.as_deref()) {
        (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
            format!("{first} {last}")
        }
        _ => user.username.clone(),
    }
}

/// Whole days elapsed since creation, floor semantics.
pub fn age_in_days(created_date: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (now - created_date).num_days()
}

/// Blob key for an uploaded attachment: a collision-resistant prefix plus the
/// original filename, with any path components stripped from the latter.
pub fn attachment_key(original_name: &str) -> String {
    let basename = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    format!("uploads/{}-{}", Uuid::new_v4(), basename)
}

/// Exact match on the final path segment. The legacy behavior was a substring
/// match over the whole path, which could remove unrelated attachments whose
/// names overlap; that is deliberately not reproduced.
fn attachment_matches(path: &str, filename: &str) -> bool {
    path.rsplit('/').next() == Some(filename)
}

/// Creates a work order, allocating its public 9-digit identifier via a
/// bounded generate-check-commit loop. A unique-index violation on insert
/// means a concurrent create won the race for that value; re-roll.
pub fn create(conn: &mut PgConnection, input: CreateWorkOrder) -> AppResult<WorkOrder> {
    require_field(&input.task_type, "taskType")?;
    require_field(&input.room_number, "roomNumber")?;
    require_field(&input.details, "details")?;
    require_member(&input.task_type, TASK_TYPES, "taskType")?;

    let priority = input
        .priority
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PRIORITY.to_string());
    require_member(&priority, PRIORITIES, "priority")?;

    let attachments: Vec<String> = input.attachment.into_iter().collect();
    let mut rng = rand::thread_rng();

    for attempt in 1..=MAX_ID_ALLOCATION_ATTEMPTS {
        let candidate = random_work_order_id(&mut rng);

        let taken: bool = select(exists(
            work_orders::table.filter(work_orders::work_order_id.eq(candidate)),
        ))
        .get_result(conn)?;
        if taken {
            warn!(candidate, attempt, "work order id collision, re-rolling");
            continue;
        }

        let record = NewWorkOrder {
            id: Uuid::new_v4(),
            work_order_id: candidate,
            task_type: input.task_type.clone(),
            room_number: input.room_number.clone(),
            details: input.details.clone(),
            notes_history: Value::Array(Vec::new()),
            submitted_by: input.submitted_by,
            priority: priority.clone(),
            attachments: attachments.clone(),
            status: DEFAULT_STATUS.to_string(),
        };

        match diesel::insert_into(work_orders::table)
            .values(&record)
            .execute(conn)
        {
            Ok(_) => {
                return work_orders::table
                    .find(record.id)
                    .first(conn)
                    .map_err(AppError::from)
            }
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                warn!(candidate, attempt, "lost work order id race on commit, re-rolling");
                continue;
            }
            Err(err) => return Err(AppError::from(err)),
        }
    }

    Err(AppError::conflict(
        "exhausted attempts to allocate a unique work order id",
    ))
}

/// All work orders newest-first, with the submitting user resolved
/// best-effort (the reference is weak; deleted users yield `None`).
pub fn list(conn: &mut PgConnection) -> AppResult<Vec<(WorkOrder, Option<User>)>> {
    let orders: Vec<WorkOrder> = work_orders::table
        .order(work_orders::created_date.desc())
        .load(conn)?;

    let submitter_ids: Vec<Uuid> = orders.iter().map(|order| order.submitted_by).collect();
    let submitters: Vec<User> = users::table
        .filter(users::id.eq_any(&submitter_ids))
        .load(conn)?;
    let by_id: HashMap<Uuid, User> = submitters
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    Ok(orders
        .into_iter()
        .map(|order| {
            let submitter = by_id.get(&order.submitted_by).cloned();
            (order, submitter)
        })
        .collect())
}

pub fn count(conn: &mut PgConnection) -> AppResult<i64> {
    Ok(work_orders::table.count().get_result(conn)?)
}

pub fn find(conn: &mut PgConnection, id: Uuid) -> AppResult<WorkOrder> {
    Ok(work_orders::table.find(id).first(conn)?)
}

/// Generic partial update. Always bumps `modified_date`, even when the patch
/// is empty. Runs under a row lock so concurrent whole-list replacements of
/// `notes_history` serialize instead of resurrecting deleted notes.
pub fn update(conn: &mut PgConnection, id: Uuid, patch: WorkOrderPatch) -> AppResult<WorkOrder> {
    if let Some(task_type) = patch.task_type.as_deref() {
        require_field(task_type, "taskType")?;
        require_member(task_type, TASK_TYPES, "taskType")?;
    }
    if let Some(room_number) = patch.room_number.as_deref() {
        require_field(room_number, "roomNumber")?;
    }
    if let Some(details) = patch.details.as_deref() {
        require_field(details, "details")?;
    }
    if let Some(priority) = patch.priority.as_deref() {
        require_member(priority, PRIORITIES, "priority")?;
    }
    if let Some(status) = patch.status.as_deref() {
        // No transition graph: any status may move to any other.
        require_member(status, STATUSES, "status")?;
    }

    let notes_value = match patch.notes_history.as_ref() {
        Some(notes) => Some(serde_json::to_value(notes)?),
        None => None,
    };

    conn.transaction::<WorkOrder, AppError, _>(|conn| {
        let _locked: WorkOrder = work_orders::table.find(id).for_update().first(conn)?;

        let changeset = WorkOrderChangeset {
            task_type: patch.task_type.as_deref(),
            room_number: patch.room_number.as_deref(),
            details: patch.details.as_deref(),
            priority: patch.priority.as_deref(),
            status: patch.status.as_deref(),
            notes_history: notes_value,
            modified_date: Utc::now().naive_utc(),
        };

        diesel::update(work_orders::table.find(id))
            .set(&changeset)
            .execute(conn)?;

        Ok(work_orders::table.find(id).first(conn)?)
    })
}

/// Appends `{note, username snapshot, timestamp}` to the note history.
/// The acting user must still exist; the snapshot is their display name at
/// append time and never changes afterwards.
pub fn add_note(
    conn: &mut PgConnection,
    id: Uuid,
    note: &str,
    acting_user_id: Uuid,
) -> AppResult<WorkOrder> {
    if note.trim().is_empty() {
        return Err(AppError::bad_request("note content is required"));
    }

    conn.transaction::<WorkOrder, AppError, _>(|conn| {
        let user: User = users::table.find(acting_user_id).first(conn)?;

        let order: WorkOrder = work_orders::table.find(id).for_update().first(conn)?;
        let mut notes = parse_notes(&order.notes_history)?;
        notes.push(NoteEntry {
            note: note.to_string(),
            username: display_name(&user),
            timestamp: Utc::now(),
        });

        diesel::update(work_orders::table.find(id))
            .set((
                work_orders::notes_history.eq(serde_json::to_value(&notes)?),
                work_orders::modified_date.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        Ok(work_orders::table.find(id).first(conn)?)
    })
}

/// Appends blob paths to the attachment list; never replaces existing
/// entries. Callers must have stored the blobs before recording them here.
pub fn add_attachments(
    conn: &mut PgConnection,
    id: Uuid,
    paths: Vec<String>,
) -> AppResult<WorkOrder> {
    conn.transaction::<WorkOrder, AppError, _>(|conn| {
        let order: WorkOrder = work_orders::table.find(id).for_update().first(conn)?;

        let mut attachments = order.attachments;
        attachments.extend(paths);

        diesel::update(work_orders::table.find(id))
            .set((
                work_orders::attachments.eq(attachments),
                work_orders::modified_date.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        Ok(work_orders::table.find(id).first(conn)?)
    })
}

/// Removes every attachment whose filename matches exactly, returning the
/// updated record and the removed paths so the caller can release the blobs.
pub fn delete_attachment(
    conn: &mut PgConnection,
    id: Uuid,
    filename: &str,
) -> AppResult<(WorkOrder, Vec<String>)> {
    conn.transaction::<(WorkOrder, Vec<String>), AppError, _>(|conn| {
        let order: WorkOrder = work_orders::table.find(id).for_update().first(conn)?;

        let (removed, kept): (Vec<String>, Vec<String>) = order
            .attachments
            .iter()
            .cloned()
            .partition(|path| attachment_matches(path, filename));

        diesel::update(work_orders::table.find(id))
            .set((
                work_orders::attachments.eq(kept),
                work_orders::modified_date.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let updated: WorkOrder = work_orders::table.find(id).first(conn)?;
        Ok((updated, removed))
    })
}

/// Hard delete. Returns the attachment paths so the caller can clean up the
/// blobs (the record is gone either way; blob cleanup is best-effort).
pub fn delete(conn: &mut PgConnection, id: Uuid) -> AppResult<Vec<String>> {
    let order: WorkOrder = work_orders::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    diesel::delete(work_orders::table.find(id)).execute(conn)?;
    Ok(order.attachments)
}
