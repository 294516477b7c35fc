//! Same-day attendance tracking
//!
//! Each worker has at most one work day per calendar date. A day moves
//! through a small state machine driven by the supervisor:
//!
//! ```text
//! not_checked_in --check-in--> present --check-out--> checked_out
//!                               |    ^
//!                     leave-start    leave-end
//!                               v    |
//!                              on_leave
//! ```
//!
//! Only one leave interval is recorded per day, and a worker on leave has
//! to be brought back before checking out. The calendar date of a punch is
//! taken in the configured work-day offset.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::cache::TtlCache;
use crate::core::error::{AppError, AppResult};
use crate::core::storage::Storage;
use crate::ledger::models::{AttendanceStatus, WorkDay};
use crate::ledger::payroll;
use crate::ledger::workers::owned_worker;

/// Supervisor actions on a worker's day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceEvent {
    CheckIn,
    LeaveStart,
    LeaveEnd,
    CheckOut,
}

impl AttendanceEvent {
    fn past_tense(&self) -> &'static str {
        match self {
            AttendanceEvent::CheckIn => "checked in",
            AttendanceEvent::LeaveStart => "started leave",
            AttendanceEvent::LeaveEnd => "ended leave",
            AttendanceEvent::CheckOut => "checked out",
        }
    }
}

impl WorkDay {
    fn new(worker_id: &str, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            worker_id: worker_id.to_string(),
            date,
            check_in: None,
            check_out: None,
            leave_start: None,
            leave_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current position in the day's state machine
    pub fn status(&self) -> AttendanceStatus {
        if self.check_in.is_none() {
            AttendanceStatus::NotCheckedIn
        } else if self.check_out.is_some() {
            AttendanceStatus::CheckedOut
        } else if self.leave_start.is_some() && self.leave_end.is_none() {
            AttendanceStatus::OnLeave
        } else {
            AttendanceStatus::Present
        }
    }

    /// Length of the closed leave interval
    pub fn leave_duration(&self) -> Duration {
        match (self.leave_start, self.leave_end) {
            (Some(start), Some(end)) if end > start => end - start,
            _ => Duration::zero(),
        }
    }

    /// Time on site minus leave, once the day is closed
    pub fn worked_duration(&self) -> Option<Duration> {
        let (check_in, check_out) = (self.check_in?, self.check_out?);
        let on_site = check_out - check_in;
        Some((on_site - self.leave_duration()).max(Duration::zero()))
    }
}

/// Apply one event to a worker's day, returning the updated day
pub fn apply_event(
    day: Option<WorkDay>,
    event: AttendanceEvent,
    worker_id: &str,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> AppResult<WorkDay> {
    let mut day = day.unwrap_or_else(|| WorkDay::new(worker_id, date, now));
    let status = day.status();

    match (event, status) {
        (AttendanceEvent::CheckIn, AttendanceStatus::NotCheckedIn) => {
            day.check_in = Some(now);
        }
        (AttendanceEvent::CheckIn, _) => {
            return Err(AppError::bad_request("worker is already checked in today"));
        }

        (AttendanceEvent::LeaveStart, AttendanceStatus::Present) => {
            if day.leave_start.is_some() {
                return Err(AppError::bad_request("leave is already taken today"));
            }
            day.leave_start = Some(now);
        }
        (AttendanceEvent::LeaveStart, AttendanceStatus::OnLeave) => {
            return Err(AppError::bad_request("leave is already taken today"));
        }

        (AttendanceEvent::LeaveEnd, AttendanceStatus::OnLeave) => {
            day.leave_end = Some(now);
        }
        (AttendanceEvent::LeaveEnd, _) => {
            return Err(AppError::bad_request("worker is not on leave"));
        }

        (AttendanceEvent::CheckOut, AttendanceStatus::Present) => {
            day.check_out = Some(now);
        }
        (AttendanceEvent::CheckOut, AttendanceStatus::OnLeave) => {
            return Err(AppError::bad_request("worker is on leave, end the leave first"));
        }

        (_, AttendanceStatus::NotCheckedIn) => {
            return Err(AppError::bad_request("worker is not checked in"));
        }
        (_, AttendanceStatus::CheckedOut) => {
            return Err(AppError::bad_request("worker is already checked out"));
        }
    }

    day.updated_at = now;
    Ok(day)
}

const WORK_DAY_COLUMNS: &str =
    "id, worker_id, work_date, check_in, check_out, leave_start, leave_end, created_at, updated_at";

fn work_day_from_row(row: &Row<'_>) -> rusqlite::Result<WorkDay> {
    Ok(WorkDay {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        date: row.get(2)?,
        check_in: row.get(3)?,
        check_out: row.get(4)?,
        leave_start: row.get(5)?,
        leave_end: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(crate) fn find_work_day(
    conn: &Connection,
    worker_id: &str,
    date: NaiveDate,
) -> AppResult<Option<WorkDay>> {
    let sql = format!(
        "SELECT {} FROM work_days WHERE worker_id = ?1 AND work_date = ?2",
        WORK_DAY_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![worker_id, date], work_day_from_row)
        .optional()?)
}

/// Work days of a worker within an inclusive date range, oldest first
pub(crate) fn work_days_between(
    conn: &Connection,
    worker_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<WorkDay>> {
    let sql = format!(
        "SELECT {} FROM work_days WHERE worker_id = ?1 AND work_date BETWEEN ?2 AND ?3
         ORDER BY work_date",
        WORK_DAY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let days = stmt
        .query_map(params![worker_id, from, to], work_day_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(days)
}

fn save_work_day(conn: &Connection, day: &WorkDay) -> AppResult<()> {
    conn.execute(
        "INSERT INTO work_days (id, worker_id, work_date, check_in, check_out, leave_start, leave_end, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
             check_in = excluded.check_in,
             check_out = excluded.check_out,
             leave_start = excluded.leave_start,
             leave_end = excluded.leave_end,
             updated_at = excluded.updated_at",
        params![
            day.id,
            day.worker_id,
            day.date,
            day.check_in,
            day.check_out,
            day.leave_start,
            day.leave_end,
            day.created_at,
            day.updated_at
        ],
    )?;
    Ok(())
}

/// Records attendance events for a supervisor's workers
pub struct AttendanceBook {
    storage: Arc<Storage>,
    cache: Arc<TtlCache>,
    offset: FixedOffset,
}

impl AttendanceBook {
    pub fn new(storage: Arc<Storage>, cache: Arc<TtlCache>, offset: FixedOffset) -> Self {
        Self {
            storage,
            cache,
            offset,
        }
    }

    /// Calendar day a timestamp belongs to
    pub fn work_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Apply an event to today's record for the worker
    pub fn record(
        &self,
        supervisor_id: &str,
        worker_id: &str,
        event: AttendanceEvent,
        now: DateTime<Utc>,
    ) -> AppResult<WorkDay> {
        let date = self.work_date(now);

        let day = self.storage.with_tx(|tx| {
            let worker = owned_worker(tx, supervisor_id, worker_id)?;
            let current = find_work_day(tx, &worker.id, date)?;
            let day = apply_event(current, event, &worker.id, date, now)?;
            save_work_day(tx, &day)?;
            Ok(day)
        })?;

        payroll::invalidate(&self.cache, worker_id);
        info!("Worker {} {} on {}", worker_id, event.past_tense(), date);
        Ok(day)
    }

    /// Work days for one worker in an inclusive range
    pub fn history(
        &self,
        supervisor_id: &str,
        worker_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<WorkDay>> {
        if from > to {
            return Err(AppError::bad_request("from date is after to date"));
        }

        self.storage.with_conn(|conn| {
            owned_worker(conn, supervisor_id, worker_id)?;
            work_days_between(conn, worker_id, from, to)
        })
    }
}
