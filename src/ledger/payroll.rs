//! Wage computation over a pay period
//!
//! A period runs from the day after the worker was last paid (or the day the
//! worker was added) through the requested pay-to date. Every completed day
//! is split into regular and overtime hours against the standard day length;
//! days without a check-out are listed but earn nothing. Only today's open
//! day holds up a payment. Earlier open days can no longer be closed, so they
//! settle unpaid with the rest of the period.
//!
//! Summaries are memoized in the cache. The cache key embeds a per-worker
//! version counter, so bumping the version through [`invalidate`] retires
//! every cached summary for that worker at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::cache::TtlCache;
use crate::core::error::{AppError, AppResult};
use crate::core::storage::{is_unique_violation, Storage};
use crate::ledger::attendance::work_days_between;
use crate::ledger::models::{Payment, PaymentStatus, WorkDay, Worker};
use crate::ledger::workers::owned_worker;

/// How a day's hours turn into pay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayPolicy {
    /// Hours covered by the base rate
    pub standard_hours: f64,
    /// Factor applied to the hourly rate beyond the standard hours
    pub overtime_multiplier: f64,
}

impl Default for PayPolicy {
    fn default() -> Self {
        Self {
            standard_hours: 8.0,
            overtime_multiplier: 1.5,
        }
    }
}

impl PayPolicy {
    pub fn hourly_rate(&self, base_rate: f64) -> f64 {
        base_rate / self.standard_hours
    }
}

/// Pay for a single work day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayPay {
    pub date: NaiveDate,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub leave_start: Option<DateTime<Utc>>,
    pub leave_end: Option<DateTime<Utc>>,
    /// False while the day has no check-out
    pub complete: bool,
    pub worked_hours: f64,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub amount: f64,
}

/// Wages owed for a period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayrollSummary {
    pub worker_id: String,
    pub full_name: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub base_rate: f64,
    pub hourly_rate: f64,
    /// Completed days in the period
    pub total_days: u32,
    pub incomplete_days: u32,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub total_amount: f64,
    pub last_paid_through: Option<NaiveDate>,
    pub days: Vec<DayPay>,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn version_key(worker_id: &str) -> String {
    format!("payrollVersion:{}", worker_id)
}

/// Retire all cached summaries for a worker
pub fn invalidate(cache: &TtlCache, worker_id: &str) {
    let version = cache.incr(&version_key(worker_id));
    debug!("Payroll cache for {} moved to version {}", worker_id, version);
}

/// Split one day into regular and overtime pay
pub fn day_pay(day: &WorkDay, base_rate: f64, policy: PayPolicy) -> DayPay {
    let hourly = policy.hourly_rate(base_rate);
    let worked = day
        .worked_duration()
        .map(|worked| worked.num_seconds() as f64 / 3600.0);

    let (worked_hours, regular_hours, overtime_hours, amount) = match worked {
        Some(hours) => {
            let regular = hours.min(policy.standard_hours);
            let overtime = (hours - regular).max(0.0);
            let amount = regular * hourly + overtime * hourly * policy.overtime_multiplier;
            (hours, regular, overtime, round_cents(amount))
        }
        None => (0.0, 0.0, 0.0, 0.0),
    };

    DayPay {
        date: day.date,
        check_in: day.check_in,
        check_out: day.check_out,
        leave_start: day.leave_start,
        leave_end: day.leave_end,
        complete: worked.is_some(),
        worked_hours: round_cents(worked_hours),
        regular_hours: round_cents(regular_hours),
        overtime_hours: round_cents(overtime_hours),
        amount,
    }
}

/// Fold a period's work days into a summary
pub fn summarize(
    worker: &Worker,
    period_start: NaiveDate,
    period_end: NaiveDate,
    days: &[WorkDay],
    policy: PayPolicy,
    last_paid_through: Option<NaiveDate>,
) -> PayrollSummary {
    let mut summary = PayrollSummary {
        worker_id: worker.id.clone(),
        full_name: worker.full_name.clone(),
        period_start,
        period_end,
        base_rate: worker.base_rate,
        hourly_rate: round_cents(policy.hourly_rate(worker.base_rate)),
        total_days: 0,
        incomplete_days: 0,
        regular_hours: 0.0,
        overtime_hours: 0.0,
        total_amount: 0.0,
        last_paid_through,
        days: Vec::with_capacity(days.len()),
    };

    for day in days {
        let pay = day_pay(day, worker.base_rate, policy);
        if pay.complete {
            summary.total_days += 1;
        } else {
            summary.incomplete_days += 1;
        }
        summary.regular_hours += pay.regular_hours;
        summary.overtime_hours += pay.overtime_hours;
        summary.total_amount += pay.amount;
        summary.days.push(pay);
    }

    summary.regular_hours = round_cents(summary.regular_hours);
    summary.overtime_hours = round_cents(summary.overtime_hours);
    summary.total_amount = round_cents(summary.total_amount);
    summary
}

const PAYMENT_COLUMNS: &str =
    "id, worker_id, period_start, period_end, base_rate, total_days, total_amount, status, created_at";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        period_start: row.get(2)?,
        period_end: row.get(3)?,
        base_rate: row.get(4)?,
        total_days: row.get(5)?,
        total_amount: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn last_paid_through(conn: &Connection, worker_id: &str) -> AppResult<Option<NaiveDate>> {
    Ok(conn
        .query_row(
            "SELECT MAX(period_end) FROM payments WHERE worker_id = ?1",
            [worker_id],
            |row| row.get::<_, Option<NaiveDate>>(0),
        )
        .optional()?
        .flatten())
}

/// Computes and settles worker wages
pub struct PayrollEngine {
    storage: Arc<Storage>,
    cache: Arc<TtlCache>,
    policy: PayPolicy,
    cache_ttl: Duration,
    offset: FixedOffset,
}

impl PayrollEngine {
    pub fn new(
        storage: Arc<Storage>,
        cache: Arc<TtlCache>,
        policy: PayPolicy,
        cache_ttl: Duration,
        offset: FixedOffset,
    ) -> Self {
        Self {
            storage,
            cache,
            policy,
            cache_ttl,
            offset,
        }
    }

    /// Today's calendar date in the work-day offset
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    fn cache_key(&self, worker_id: &str, start: NaiveDate, end: NaiveDate) -> String {
        let version = self
            .cache
            .get(&version_key(worker_id))
            .unwrap_or_else(|| "0".to_string());
        format!("payroll:{}:{}:{}:{}", worker_id, version, start, end)
    }

    /// First unpaid day, along with the end of the last settled period
    fn period_start(
        &self,
        conn: &Connection,
        worker: &Worker,
    ) -> AppResult<(NaiveDate, Option<NaiveDate>)> {
        let paid_through = last_paid_through(conn, &worker.id)?;
        let start = match paid_through {
            Some(end) => end.succ_opt().unwrap_or(end),
            None => worker.created_at.with_timezone(&self.offset).date_naive(),
        };
        Ok((start, paid_through))
    }

    fn compute(
        &self,
        conn: &Connection,
        worker: &Worker,
        pay_to: NaiveDate,
        today: NaiveDate,
    ) -> AppResult<PayrollSummary> {
        if pay_to > today {
            return Err(AppError::bad_request("paymentToDate cannot be in the future"));
        }
        let (start, paid_through) = self.period_start(conn, worker)?;
        if pay_to < start {
            return Err(AppError::bad_request(format!(
                "paymentToDate must be on or after {}",
                start
            )));
        }

        let days = work_days_between(conn, &worker.id, start, pay_to)?;
        Ok(summarize(worker, start, pay_to, &days, self.policy, paid_through))
    }

    /// Wages owed from the last payment through `pay_to`, which may not be
    /// later than today
    pub fn worker_details(
        &self,
        supervisor_id: &str,
        worker_id: &str,
        pay_to: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<PayrollSummary> {
        let today = self.today(now);
        if pay_to > today {
            return Err(AppError::bad_request("paymentToDate cannot be in the future"));
        }
        self.storage.with_conn(|conn| {
            let worker = owned_worker(conn, supervisor_id, worker_id)?;
            let (start, _) = self.period_start(conn, &worker)?;
            let key = self.cache_key(&worker.id, start, pay_to);
            if let Some(raw) = self.cache.get(&key) {
                match serde_json::from_str::<PayrollSummary>(&raw) {
                    Ok(summary) => {
                        debug!("Payroll cache hit for {}", key);
                        return Ok(summary);
                    }
                    Err(e) => warn!("Discarding unreadable payroll cache entry {}: {}", key, e),
                }
            }

            let summary = self.compute(conn, &worker, pay_to, today)?;
            self.cache
                .set(&key, serde_json::to_string(&summary)?, Some(self.cache_ttl));
            Ok(summary)
        })
    }

    /// Settle the period ending at `pay_to`
    pub fn pay(
        &self,
        supervisor_id: &str,
        worker_id: &str,
        pay_to: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Payment> {
        let today = self.today(now);
        let payment = self.storage.with_tx(|tx| {
            let worker = owned_worker(tx, supervisor_id, worker_id)?;
            let summary = self.compute(tx, &worker, pay_to, today)?;

            if summary.days.iter().any(|day| !day.complete && day.date >= today) {
                return Err(AppError::bad_request("worker has not checked out today"));
            }
            if summary.total_days == 0 {
                return Err(AppError::bad_request("no completed work days in this period"));
            }

            let payment = Payment {
                id: Uuid::new_v4().to_string(),
                worker_id: worker.id.clone(),
                period_start: summary.period_start,
                period_end: summary.period_end,
                base_rate: worker.base_rate,
                total_days: summary.total_days,
                total_amount: summary.total_amount,
                status: PaymentStatus::Paid,
                created_at: now,
            };

            tx.execute(
                "INSERT INTO payments (id, worker_id, period_start, period_end, base_rate, total_days, total_amount, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    payment.id,
                    payment.worker_id,
                    payment.period_start,
                    payment.period_end,
                    payment.base_rate,
                    payment.total_days,
                    payment.total_amount,
                    payment.status,
                    payment.created_at
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::bad_request("payment already recorded for this period")
                } else {
                    AppError::from(e)
                }
            })?;

            Ok(payment)
        })?;

        invalidate(&self.cache, worker_id);
        info!(
            "Paid worker {} {:.2} for {} to {}",
            worker_id, payment.total_amount, payment.period_start, payment.period_end
        );
        Ok(payment)
    }

    /// Payment history, newest period first
    pub fn payments(&self, supervisor_id: &str, worker_id: &str) -> AppResult<Vec<Payment>> {
        self.storage.with_conn(|conn| {
            owned_worker(conn, supervisor_id, worker_id)?;
            let sql = format!(
                "SELECT {} FROM payments WHERE worker_id = ?1 ORDER BY period_end DESC",
                PAYMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let payments = stmt
                .query_map([worker_id], payment_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(payments)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::attendance::{AttendanceBook, AttendanceEvent};
    use chrono::{Offset, TimeZone};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    /// Late on the last day of the month, when the whole of March is payable
    fn month_end() -> DateTime<Utc> {
        at(31, 23, 0)
    }

    fn work_day(check_in: DateTime<Utc>, check_out: Option<DateTime<Utc>>) -> WorkDay {
        WorkDay {
            id: "d1".to_string(),
            worker_id: "w1".to_string(),
            date: check_in.date_naive(),
            check_in: Some(check_in),
            check_out,
            leave_start: None,
            leave_end: None,
            created_at: check_in,
            updated_at: check_in,
        }
    }

    struct Fixture {
        engine: PayrollEngine,
        book: AttendanceBook,
        storage: Arc<Storage>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let cache = Arc::new(TtlCache::new());
        storage
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO users (id, full_name, email, password_hash, role, created_at, updated_at)
                     VALUES ('sup-1', 'Sup', 'sup@example.com', 'x', 'supervisor', ?1, ?1)",
                    [at(1, 0, 0)],
                )?;
                conn.execute(
                    "INSERT INTO workers (id, supervisor_id, full_name, phone_number, base_rate, created_at, updated_at)
                     VALUES ('w1', 'sup-1', 'Meena', '9000000001', 800.0, ?1, ?1)",
                    [at(1, 6, 0)],
                )?;
                Ok(())
            })
            .unwrap();

        Fixture {
            engine: PayrollEngine::new(
                storage.clone(),
                cache.clone(),
                PayPolicy::default(),
                Duration::from_secs(300),
                Utc.fix(),
            ),
            book: AttendanceBook::new(storage.clone(), cache, Utc.fix()),
            storage,
        }
    }

    fn full_day(fx: &Fixture, day: u32, out_hour: u32) {
        fx.book.record("sup-1", "w1", AttendanceEvent::CheckIn, at(day, 8, 0)).unwrap();
        fx.book
            .record("sup-1", "w1", AttendanceEvent::CheckOut, at(day, out_hour, 0))
            .unwrap();
    }

    #[test]
    fn test_day_pay_splits_overtime() {
        let policy = PayPolicy::default();
        let pay = day_pay(&work_day(at(4, 8, 0), Some(at(4, 18, 0))), 800.0, policy);
        assert!(pay.complete);
        assert_eq!(pay.regular_hours, 8.0);
        assert_eq!(pay.overtime_hours, 2.0);
        assert_eq!(pay.amount, 1100.0);

        let short = day_pay(&work_day(at(4, 8, 0), Some(at(4, 12, 30))), 800.0, policy);
        assert_eq!(short.overtime_hours, 0.0);
        assert_eq!(short.amount, 450.0);
    }

    #[test]
    fn test_day_pay_subtracts_leave() {
        let mut day = work_day(at(4, 8, 0), Some(at(4, 17, 0)));
        day.leave_start = Some(at(4, 12, 0));
        day.leave_end = Some(at(4, 13, 0));

        let pay = day_pay(&day, 800.0, PayPolicy::default());
        assert_eq!(pay.worked_hours, 8.0);
        assert_eq!(pay.amount, 800.0);
    }

    #[test]
    fn test_open_day_earns_nothing() {
        let pay = day_pay(&work_day(at(4, 8, 0), None), 800.0, PayPolicy::default());
        assert!(!pay.complete);
        assert_eq!(pay.amount, 0.0);
    }

    #[test]
    fn test_worker_details_over_period() {
        let fx = fixture();
        full_day(&fx, 4, 16);
        full_day(&fx, 5, 18);
        fx.book.record("sup-1", "w1", AttendanceEvent::CheckIn, at(6, 8, 0)).unwrap();

        let summary = fx
            .engine
            .worker_details("sup-1", "w1", date(3, 31), month_end())
            .unwrap();
        assert_eq!(summary.period_start, date(3, 1));
        assert_eq!(summary.hourly_rate, 100.0);
        assert_eq!(summary.total_days, 2);
        assert_eq!(summary.incomplete_days, 1);
        assert_eq!(summary.overtime_hours, 2.0);
        assert_eq!(summary.total_amount, 1900.0);
        assert_eq!(summary.days.len(), 3);
        assert_eq!(summary.last_paid_through, None);

        assert!(matches!(
            fx.engine.worker_details("sup-2", "w1", date(3, 31), month_end()),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_details_are_memoized_until_invalidated() {
        let fx = fixture();
        full_day(&fx, 4, 16);
        let first = fx
            .engine
            .worker_details("sup-1", "w1", date(3, 31), month_end())
            .unwrap();

        // Written behind the engine's back, so the cached summary still wins
        fx.storage
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO work_days (id, worker_id, work_date, check_in, check_out, created_at, updated_at)
                     VALUES ('raw', 'w1', ?1, ?2, ?3, ?2, ?2)",
                    params![date(3, 7), at(7, 8, 0), at(7, 16, 0)],
                )?;
                Ok(())
            })
            .unwrap();
        let cached = fx.engine.worker_details("sup-1", "w1", date(3, 31), month_end());
        assert_eq!(cached.unwrap(), first);

        invalidate(&fx.engine.cache, "w1");
        let fresh = fx
            .engine
            .worker_details("sup-1", "w1", date(3, 31), month_end())
            .unwrap();
        assert_eq!(fresh.total_days, 2);
        assert_eq!(fresh.total_amount, 1600.0);
    }

    #[test]
    fn test_attendance_change_refreshes_details() {
        let fx = fixture();
        full_day(&fx, 4, 16);
        assert_eq!(
            fx.engine.worker_details("sup-1", "w1", date(3, 31), month_end()).unwrap().total_days,
            1
        );

        full_day(&fx, 5, 16);
        assert_eq!(
            fx.engine.worker_details("sup-1", "w1", date(3, 31), month_end()).unwrap().total_days,
            2
        );
    }

    #[test]
    fn test_pay_moves_period_forward() {
        let fx = fixture();
        full_day(&fx, 4, 16);
        full_day(&fx, 5, 16);

        let payment = fx.engine.pay("sup-1", "w1", date(3, 5), at(5, 20, 0)).unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.total_days, 2);
        assert_eq!(payment.total_amount, 1600.0);

        let next = fx.engine.worker_details("sup-1", "w1", date(3, 31), month_end()).unwrap();
        assert_eq!(next.period_start, date(3, 6));
        assert_eq!(next.last_paid_through, Some(date(3, 5)));
        assert_eq!(next.total_days, 0);

        assert!(matches!(
            fx.engine.worker_details("sup-1", "w1", date(3, 5), month_end()),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            fx.engine.pay("sup-1", "w1", date(3, 5), at(5, 21, 0)),
            Err(AppError::BadRequest(_))
        ));

        let history = fx.engine.payments("sup-1", "w1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].period_end, date(3, 5));
    }

    #[test]
    fn test_pay_rejects_open_or_empty_periods() {
        let fx = fixture();
        assert!(matches!(
            fx.engine.pay("sup-1", "w1", date(3, 31), month_end()),
            Err(AppError::BadRequest(msg)) if msg == "no completed work days in this period"
        ));

        full_day(&fx, 4, 16);
        fx.book.record("sup-1", "w1", AttendanceEvent::CheckIn, at(5, 8, 0)).unwrap();
        assert!(matches!(
            fx.engine.pay("sup-1", "w1", date(3, 5), at(5, 12, 0)),
            Err(AppError::BadRequest(msg)) if msg == "worker has not checked out today"
        ));
        assert!(fx.engine.payments("sup-1", "w1").unwrap().is_empty());
    }

    #[test]
    fn test_past_open_day_settles_unpaid() {
        let fx = fixture();
        fx.book.record("sup-1", "w1", AttendanceEvent::CheckIn, at(4, 8, 0)).unwrap();
        for day in 5..=9 {
            full_day(&fx, day, 16);
        }

        let payment = fx.engine.pay("sup-1", "w1", date(3, 9), at(10, 9, 0)).unwrap();
        assert_eq!(payment.period_start, date(3, 1));
        assert_eq!(payment.total_days, 5);
        assert_eq!(payment.total_amount, 4000.0);

        // The forgotten check-out is behind the new period start
        let next = fx.engine.worker_details("sup-1", "w1", date(3, 10), at(10, 9, 0)).unwrap();
        assert_eq!(next.period_start, date(3, 10));
        assert_eq!(next.incomplete_days, 0);
    }

    #[test]
    fn test_pay_to_cannot_be_in_the_future() {
        let fx = fixture();
        full_day(&fx, 4, 16);

        for result in [
            fx.engine.pay("sup-1", "w1", date(3, 31), at(5, 9, 0)).map(|_| ()),
            fx.engine.worker_details("sup-1", "w1", date(3, 6), at(5, 9, 0)).map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(AppError::BadRequest(msg)) if msg == "paymentToDate cannot be in the future"
            ));
        }

        // Work recorded later is still owed once its day has come
        let payment = fx.engine.pay("sup-1", "w1", date(3, 5), at(5, 9, 0)).unwrap();
        assert_eq!(payment.period_end, date(3, 5));
        full_day(&fx, 6, 16);
        let next = fx.engine.pay("sup-1", "w1", date(3, 6), at(6, 20, 0)).unwrap();
        assert_eq!(next.period_start, date(3, 6));
        assert_eq!(next.total_amount, 800.0);
    }
}
