//! Worker roster kept by each supervisor

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::cache::TtlCache;
use crate::core::error::{AppError, AppResult};
use crate::core::storage::{is_unique_violation, Storage};
use crate::ledger::accounts::non_blank;
use crate::ledger::attendance::find_work_day;
use crate::ledger::models::{AttendanceStatus, WorkDay, Worker};
use crate::ledger::payroll;

/// Fields for a new worker; all are required
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorker {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub base_rate: Option<f64>,
}

/// Partial worker update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerUpdate {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub base_rate: Option<f64>,
}

/// Roster entry with today's attendance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOverview {
    #[serde(flatten)]
    pub worker: Worker,
    pub today: Option<WorkDay>,
    pub status: AttendanceStatus,
}

const WORKER_COLUMNS: &str =
    "id, supervisor_id, full_name, phone_number, base_rate, created_at, updated_at";

fn worker_from_row(row: &Row<'_>) -> rusqlite::Result<Worker> {
    Ok(Worker {
        id: row.get(0)?,
        supervisor_id: row.get(1)?,
        full_name: row.get(2)?,
        phone_number: row.get(3)?,
        base_rate: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn find_worker(conn: &Connection, worker_id: &str) -> AppResult<Option<Worker>> {
    let sql = format!("SELECT {} FROM workers WHERE id = ?1", WORKER_COLUMNS);
    Ok(conn.query_row(&sql, [worker_id], worker_from_row).optional()?)
}

fn find_worker_by_phone(conn: &Connection, phone_number: &str) -> AppResult<Option<Worker>> {
    let sql = format!("SELECT {} FROM workers WHERE phone_number = ?1", WORKER_COLUMNS);
    Ok(conn.query_row(&sql, [phone_number], worker_from_row).optional()?)
}

/// Load a worker that must belong to `supervisor_id`
pub(crate) fn owned_worker(
    conn: &Connection,
    supervisor_id: &str,
    worker_id: &str,
) -> AppResult<Worker> {
    if worker_id.trim().is_empty() {
        return Err(AppError::bad_request("workerId is required"));
    }

    let worker =
        find_worker(conn, worker_id)?.ok_or_else(|| AppError::not_found("worker not found"))?;
    if worker.supervisor_id != supervisor_id {
        return Err(AppError::unauthorized("supervisor is not authorized"));
    }
    Ok(worker)
}

fn valid_rate(rate: f64) -> AppResult<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(AppError::bad_request("baseRate must be a positive number"))
    }
}

fn phone_conflict(err: rusqlite::Error, message: &str) -> AppError {
    if is_unique_violation(&err) {
        AppError::bad_request(message)
    } else {
        AppError::from(err)
    }
}

pub struct WorkerRoster {
    storage: Arc<Storage>,
    cache: Arc<TtlCache>,
    offset: FixedOffset,
}

impl WorkerRoster {
    pub fn new(storage: Arc<Storage>, cache: Arc<TtlCache>, offset: FixedOffset) -> Self {
        Self {
            storage,
            cache,
            offset,
        }
    }

    /// Put a new worker on the supervisor's roster
    pub fn add(&self, supervisor_id: &str, new: NewWorker, now: DateTime<Utc>) -> AppResult<Worker> {
        let (Some(full_name), Some(phone_number), Some(base_rate)) = (
            non_blank(new.full_name.as_deref()),
            non_blank(new.phone_number.as_deref()),
            new.base_rate,
        ) else {
            return Err(AppError::bad_request("all field are required"));
        };
        let base_rate = valid_rate(base_rate)?;

        let worker = Worker {
            id: Uuid::new_v4().to_string(),
            supervisor_id: supervisor_id.to_string(),
            full_name,
            phone_number,
            base_rate,
            created_at: now,
            updated_at: now,
        };

        self.storage.with_conn(|conn| {
            if find_worker_by_phone(conn, &worker.phone_number)?.is_some() {
                return Err(AppError::bad_request("worker is already added"));
            }
            conn.execute(
                "INSERT INTO workers (id, supervisor_id, full_name, phone_number, base_rate, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    worker.id,
                    worker.supervisor_id,
                    worker.full_name,
                    worker.phone_number,
                    worker.base_rate,
                    worker.created_at,
                    worker.updated_at
                ],
            )
            .map_err(|e| phone_conflict(e, "worker is already added"))?;
            Ok(())
        })?;

        info!("Supervisor {} added worker {}", supervisor_id, worker.id);
        Ok(worker)
    }

    /// Change a worker's name, phone number or rate
    pub fn edit(
        &self,
        supervisor_id: &str,
        worker_id: &str,
        update: WorkerUpdate,
        now: DateTime<Utc>,
    ) -> AppResult<Worker> {
        let full_name = non_blank(update.full_name.as_deref());
        let phone_number = non_blank(update.phone_number.as_deref());
        if full_name.is_none() && phone_number.is_none() && update.base_rate.is_none() {
            return Err(AppError::bad_request("all field are empty"));
        }
        let base_rate = update.base_rate.map(valid_rate).transpose()?;

        let worker = self.storage.with_conn(|conn| {
            let mut worker = owned_worker(conn, supervisor_id, worker_id)?;

            if let Some(phone_number) = phone_number {
                if let Some(holder) = find_worker_by_phone(conn, &phone_number)? {
                    if holder.id != worker.id {
                        return Err(AppError::bad_request("phone number is already added"));
                    }
                }
                worker.phone_number = phone_number;
            }
            if let Some(full_name) = full_name {
                worker.full_name = full_name;
            }
            if let Some(base_rate) = base_rate {
                worker.base_rate = base_rate;
            }
            worker.updated_at = now;

            conn.execute(
                "UPDATE workers SET full_name = ?1, phone_number = ?2, base_rate = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    worker.full_name,
                    worker.phone_number,
                    worker.base_rate,
                    worker.updated_at,
                    worker.id
                ],
            )
            .map_err(|e| phone_conflict(e, "phone number is already added"))?;
            Ok(worker)
        })?;

        payroll::invalidate(&self.cache, &worker.id);
        Ok(worker)
    }

    /// Remove a worker with their attendance and payments
    pub fn delete(&self, supervisor_id: &str, worker_id: &str) -> AppResult<String> {
        self.storage.with_conn(|conn| {
            owned_worker(conn, supervisor_id, worker_id)?;
            conn.execute("DELETE FROM workers WHERE id = ?1", [worker_id])?;
            Ok(())
        })?;

        payroll::invalidate(&self.cache, worker_id);
        info!("Supervisor {} deleted worker {}", supervisor_id, worker_id);
        Ok(worker_id.to_string())
    }

    /// The supervisor's workers, with what each is doing today
    pub fn list(&self, supervisor_id: &str, now: DateTime<Utc>) -> AppResult<Vec<WorkerOverview>> {
        let today = now.with_timezone(&self.offset).date_naive();

        self.storage.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM workers WHERE supervisor_id = ?1 ORDER BY created_at, full_name",
                WORKER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let workers = stmt
                .query_map([supervisor_id], worker_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            workers
                .into_iter()
                .map(|worker| -> AppResult<WorkerOverview> {
                    let day = find_work_day(conn, &worker.id, today)?;
                    let status = day
                        .as_ref()
                        .map(WorkDay::status)
                        .unwrap_or(AttendanceStatus::NotCheckedIn);
                    Ok(WorkerOverview {
                        worker,
                        today: day,
                        status,
                    })
                })
                .collect()
        })
    }
}
