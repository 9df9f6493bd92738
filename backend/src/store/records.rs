use chrono::{NaiveDate, Utc};
use common::model::audit::{field_diff, Actor, AuditAction, NewAuditEntry};
use common::model::record::{
    record_date, ImageRef, IndicatorResult, Indicators, RecordInput, RecordStatus,
    SterilizationRecord,
};
use common::status::compute_status;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::audit::insert_audit;
use super::{format_timestamp, parse_timestamp, sql_limit, Store};
use crate::error::ApiError;

pub(crate) const RECORD_ENTITY: &str = "record";

const SELECT_RECORD: &str = "SELECT id, date, sterilizer, program, mechanical, chemical_external, \
     chemical_internal, bio_test, status, slip_image, attest_image, equipment, notes, \
     sterile_staff, result_reader, created_by, created_at, updated_at FROM records";

/// Raw column values of a `records` row, converted to the model outside the
/// rusqlite row callback so conversion failures surface as `ApiError`s.
struct RecordRow {
    id: String,
    date: String,
    sterilizer: String,
    program: String,
    indicators: [Option<String>; 4],
    status: String,
    slip_image: Option<String>,
    attest_image: Option<String>,
    equipment: String,
    notes: String,
    sterile_staff: String,
    result_reader: String,
    created_by: String,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RecordRow {
            id: row.get(0)?,
            date: row.get(1)?,
            sterilizer: row.get(2)?,
            program: row.get(3)?,
            indicators: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
            status: row.get(8)?,
            slip_image: row.get(9)?,
            attest_image: row.get(10)?,
            equipment: row.get(11)?,
            notes: row.get(12)?,
            sterile_staff: row.get(13)?,
            result_reader: row.get(14)?,
            created_by: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }

    fn into_record(self) -> Result<SterilizationRecord, ApiError> {
        let corrupt = |field: &str, e: String| {
            ApiError::Internal(format!("record {} has corrupt {}: {}", self.id, field, e))
        };
        let [mechanical, chemical_external, chemical_internal, bio_test] = self
            .indicators
            .map(|raw| raw.map(|v| v.parse::<IndicatorResult>()).transpose());

        let indicators = Indicators {
            mechanical: mechanical.map_err(|e| corrupt("mechanical", e))?,
            chemical_external: chemical_external.map_err(|e| corrupt("chemical_external", e))?,
            chemical_internal: chemical_internal.map_err(|e| corrupt("chemical_internal", e))?,
            bio_test: bio_test.map_err(|e| corrupt("bio_test", e))?,
        };

        Ok(SterilizationRecord {
            date: record_date::parse(&self.date)
                .ok_or_else(|| corrupt("date", self.date.clone()))?,
            program: self.program.parse().map_err(|e| corrupt("program", e))?,
            status: self
                .status
                .parse::<RecordStatus>()
                .map_err(|e| corrupt("status", e))?,
            slip_image: from_json_column(self.slip_image.as_deref())?,
            attest_image: from_json_column(self.attest_image.as_deref())?,
            equipment: serde_json::from_str(&self.equipment)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            indicators,
            id: self.id,
            sterilizer: self.sterilizer,
            notes: self.notes,
            sterile_staff: self.sterile_staff,
            result_reader: self.result_reader,
            created_by: self.created_by,
        })
    }
}

fn from_json_column<T: DeserializeOwned>(raw: Option<&str>) -> Result<Option<T>, ApiError> {
    raw.map(serde_json::from_str).transpose().map_err(Into::into)
}

fn to_json_column<T: Serialize>(value: Option<&T>) -> Result<Option<String>, ApiError> {
    value.map(serde_json::to_string).transpose().map_err(Into::into)
}

fn indicator_column(value: Option<IndicatorResult>) -> Option<&'static str> {
    value.map(|v| v.as_str())
}

/// The record as a JSON object, the shape used in audit details.
fn to_object(record: &SterilizationRecord) -> Result<Map<String, Value>, ApiError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::Internal("record did not serialize to an object".into())),
    }
}

fn select_record(conn: &Connection, id: &str) -> Result<Option<SterilizationRecord>, ApiError> {
    let row = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_RECORD),
            params![id],
            RecordRow::from_row,
        )
        .optional()?;
    row.map(RecordRow::into_record).transpose()
}

fn write_record(conn: &Connection, record: &SterilizationRecord) -> Result<(), ApiError> {
    conn.execute(
        "INSERT OR REPLACE INTO records (id, date, sterilizer, program, mechanical, \
         chemical_external, chemical_internal, bio_test, status, slip_image, attest_image, \
         equipment, notes, sterile_staff, result_reader, created_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            record.id,
            record.date.format("%Y-%m-%d").to_string(),
            record.sterilizer,
            record.program.as_str(),
            indicator_column(record.indicators.mechanical),
            indicator_column(record.indicators.chemical_external),
            indicator_column(record.indicators.chemical_internal),
            indicator_column(record.indicators.bio_test),
            record.status.as_str(),
            to_json_column(record.slip_image.as_ref())?,
            to_json_column(record.attest_image.as_ref())?,
            serde_json::to_string(&record.equipment)?,
            record.notes,
            record.sterile_staff,
            record.result_reader,
            record.created_by,
            format_timestamp(&record.created_at),
            format_timestamp(&record.updated_at),
        ],
    )?;
    Ok(())
}

/// A record after an update or delete, with the photo paths that no row references
/// any more. Blob names are content addressed, so one photo can back several records.
#[derive(Debug)]
pub struct RecordWrite {
    pub record: SterilizationRecord,
    pub released_images: Vec<String>,
}

/// Paths among `images` that no `records` row points at.
fn unreferenced<'a>(
    conn: &Connection,
    images: impl Iterator<Item = &'a ImageRef>,
) -> Result<Vec<String>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*) FROM records \
         WHERE json_extract(slip_image, '$.path') = ?1 \
            OR json_extract(attest_image, '$.path') = ?1",
    )?;
    let mut released: Vec<String> = Vec::new();
    for image in images {
        if released.contains(&image.path) {
            continue;
        }
        let users: i64 = stmt.query_row(params![image.path], |row| row.get(0))?;
        if users == 0 {
            released.push(image.path.clone());
        }
    }
    Ok(released)
}

fn input_error(message: String) -> ApiError {
    ApiError::Validation(message)
}

impl Store {
    /// Creates a record from the load-in form.
    ///
    /// Staff fields left empty are pre-filled with the acting user's email.
    pub fn create_record(
        &self,
        input: RecordInput,
        actor: &Actor,
    ) -> Result<SterilizationRecord, ApiError> {
        input.validate().map_err(input_error)?;
        let now = Utc::now();
        let prefill = |value: String| {
            if value.trim().is_empty() {
                actor.email.clone()
            } else {
                value
            }
        };
        let record = SterilizationRecord {
            id: Uuid::new_v4().to_string(),
            status: compute_status(&input.indicators),
            date: input.date,
            sterilizer: input.sterilizer.trim().to_string(),
            program: input.program,
            indicators: input.indicators,
            slip_image: input.slip_image,
            attest_image: input.attest_image,
            equipment: input.equipment,
            notes: input.notes,
            sterile_staff: prefill(input.sterile_staff),
            result_reader: prefill(input.result_reader),
            created_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        write_record(&tx, &record)?;
        insert_audit(
            &tx,
            actor,
            NewAuditEntry {
                action: AuditAction::Create,
                entity_type: RECORD_ENTITY.to_string(),
                entity_id: record.id.clone(),
                details: to_object(&record)?,
            },
        )?;
        tx.commit()?;

        info!(
            "Record {} created by {} ({} {}, status {})",
            record.id,
            actor.id,
            record.program,
            record.date,
            record.status.as_str()
        );
        Ok(record)
    }

    pub fn get_record(&self, id: &str) -> Result<Option<SterilizationRecord>, ApiError> {
        let conn = self.connect()?;
        select_record(&conn, id)
    }

    /// Records ordered by creation time, newest first.
    pub fn list_records(&self, limit: Option<usize>) -> Result<Vec<SterilizationRecord>, ApiError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            SELECT_RECORD
        ))?;
        let rows = stmt
            .query_map(params![sql_limit(limit)], RecordRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    /// Records whose cycle date lies in `[from, to]` (both optional).
    pub fn list_records_between(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<SterilizationRecord>, ApiError> {
        Ok(self
            .list_records(None)?
            .into_iter()
            .filter(|r| from.is_none_or(|from| r.date >= from))
            .filter(|r| to.is_none_or(|to| r.date <= to))
            .collect())
    }

    /// Replaces the editable fields of a record and re-derives its status.
    ///
    /// Writes an UPDATE audit row with the field-level diff, plus a STATUS_CHANGE row
    /// when the derived status moved. Last write wins. Photos replaced by the edit
    /// and used by no other record are reported as released.
    pub fn update_record(
        &self,
        id: &str,
        input: RecordInput,
        actor: &Actor,
    ) -> Result<RecordWrite, ApiError> {
        input.validate().map_err(input_error)?;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let before = select_record(&tx, id)?
            .ok_or_else(|| ApiError::NotFound(format!("record '{}' not found", id)))?;

        let after = SterilizationRecord {
            id: before.id.clone(),
            status: compute_status(&input.indicators),
            date: input.date,
            sterilizer: input.sterilizer.trim().to_string(),
            program: input.program,
            indicators: input.indicators,
            slip_image: input.slip_image,
            attest_image: input.attest_image,
            equipment: input.equipment,
            notes: input.notes,
            sterile_staff: input.sterile_staff,
            result_reader: input.result_reader,
            created_by: before.created_by.clone(),
            created_at: before.created_at,
            updated_at: Utc::now(),
        };
        write_record(&tx, &after)?;

        let mut changes = field_diff(&to_object(&before)?, &to_object(&after)?);
        changes.remove("updated_at");
        insert_audit(
            &tx,
            actor,
            NewAuditEntry {
                action: AuditAction::Update,
                entity_type: RECORD_ENTITY.to_string(),
                entity_id: after.id.clone(),
                details: changes,
            },
        )?;
        if before.status != after.status {
            let mut details = Map::new();
            details.insert("before".to_string(), json!(before.status));
            details.insert("after".to_string(), json!(after.status));
            insert_audit(
                &tx,
                actor,
                NewAuditEntry {
                    action: AuditAction::StatusChange,
                    entity_type: RECORD_ENTITY.to_string(),
                    entity_id: after.id.clone(),
                    details,
                },
            )?;
        }
        let released_images = unreferenced(&tx, before.images())?;
        tx.commit()?;

        info!(
            "Record {} updated by {} (status {} -> {})",
            after.id,
            actor.id,
            before.status.as_str(),
            after.status.as_str()
        );
        Ok(RecordWrite {
            record: after,
            released_images,
        })
    }

    /// Hard-deletes a record. The DELETE audit row keeps the prior state.
    pub fn delete_record(&self, id: &str, actor: &Actor) -> Result<RecordWrite, ApiError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let before = select_record(&tx, id)?
            .ok_or_else(|| ApiError::NotFound(format!("record '{}' not found", id)))?;
        tx.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        insert_audit(
            &tx,
            actor,
            NewAuditEntry {
                action: AuditAction::Delete,
                entity_type: RECORD_ENTITY.to_string(),
                entity_id: before.id.clone(),
                details: to_object(&before)?,
            },
        )?;
        let released_images = unreferenced(&tx, before.images())?;
        tx.commit()?;

        info!("Record {} deleted by {}", before.id, actor.id);
        Ok(RecordWrite {
            record: before,
            released_images,
        })
    }
}
