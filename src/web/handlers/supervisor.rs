use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::core::{AppError, AppResult};
use crate::ledger::AttendanceEvent;
use crate::ledger::workers::{NewWorker, WorkerUpdate};
use crate::web::models::{parse_date, ApiResponse, DateRangeQuery, PayPeriodRequest, WorkerIdRequest};
use crate::web::server::AppState;
use crate::web::session::require_supervisor;

fn worker_id(raw: Option<&str>) -> AppResult<&str> {
    raw.map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("workerId is required"))
}

/// Add a worker to the caller's roster
pub async fn add_worker(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<NewWorker>,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let worker = data
        .workers
        .add(&supervisor.id, request.into_inner(), Utc::now())?;

    Ok(HttpResponse::Created().json(ApiResponse::new(201, worker, "worker added successfully")))
}

/// Update a worker's details
pub async fn edit_worker(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    request: web::Json<WorkerUpdate>,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let worker = data.workers.edit(
        &supervisor.id,
        &path.into_inner(),
        request.into_inner(),
        Utc::now(),
    )?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        worker,
        "worker details update successfully",
    )))
}

/// Remove a worker named in the request body
pub async fn delete_worker(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<WorkerIdRequest>,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let id = worker_id(request.worker_id.as_deref())?;
    let deleted = data.workers.delete(&supervisor.id, id)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, deleted, "worker deleted successfully")))
}

/// The caller's workers with today's status
pub async fn all_workers(
    data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let workers = data.workers.list(&supervisor.id, Utc::now())?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, workers, "workers fetched successfully")))
}

async fn record_event(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<WorkerIdRequest>,
    event: AttendanceEvent,
    message: &str,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let id = worker_id(request.worker_id.as_deref())?;
    let day = data.attendance.record(&supervisor.id, id, event, Utc::now())?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, day, message)))
}

pub async fn check_in_worker(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<WorkerIdRequest>,
) -> Result<HttpResponse, AppError> {
    record_event(data, req, request, AttendanceEvent::CheckIn, "worker checked in successfully").await
}

pub async fn check_out_worker(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<WorkerIdRequest>,
) -> Result<HttpResponse, AppError> {
    record_event(data, req, request, AttendanceEvent::CheckOut, "worker checked out successfully")
        .await
}

pub async fn leave_start_worker(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<WorkerIdRequest>,
) -> Result<HttpResponse, AppError> {
    record_event(data, req, request, AttendanceEvent::LeaveStart, "worker leave started").await
}

pub async fn leave_end_worker(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<WorkerIdRequest>,
) -> Result<HttpResponse, AppError> {
    record_event(data, req, request, AttendanceEvent::LeaveEnd, "worker leave ended").await
}

/// Wages owed through `paymentToDate`, defaulting to today
pub async fn worker_detail(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<PayPeriodRequest>,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let id = worker_id(request.worker_id.as_deref())?.to_string();
    let now = Utc::now();
    let pay_to = parse_date(
        "paymentToDate",
        request.payment_to_date.as_deref(),
        data.config.workday_offset(),
        data.payroll.today(now),
    )?;

    // Summaries walk every day of the period on the database lock
    let summary =
        web::block(move || data.payroll.worker_details(&supervisor.id, &id, pay_to, now))
            .await??;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        summary,
        "worker details fetched successfully",
    )))
}

/// Settle wages through `paymentToDate`
pub async fn pay_worker(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<PayPeriodRequest>,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let id = worker_id(request.worker_id.as_deref())?.to_string();
    let now = Utc::now();
    let pay_to = parse_date(
        "paymentToDate",
        request.payment_to_date.as_deref(),
        data.config.workday_offset(),
        data.payroll.today(now),
    )?;

    let payment =
        web::block(move || data.payroll.pay(&supervisor.id, &id, pay_to, now)).await??;

    Ok(HttpResponse::Created().json(ApiResponse::new(
        201,
        payment,
        "payment recorded successfully",
    )))
}

/// Payment history for a worker
pub async fn payments(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let history = data.payroll.payments(&supervisor.id, &path.into_inner())?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, history, "payments fetched successfully")))
}

/// Attendance history for a worker; the range defaults to today
pub async fn attendance(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<DateRangeQuery>,
) -> Result<HttpResponse, AppError> {
    let supervisor = require_supervisor(&data, &req)?;
    let offset = data.config.workday_offset();
    let today = data.attendance.work_date(Utc::now());
    let to = parse_date("to", query.to.as_deref(), offset, today)?;
    let from = parse_date("from", query.from.as_deref(), offset, to)?;

    let days = data
        .attendance
        .history(&supervisor.id, &path.into_inner(), from, to)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, days, "attendance fetched successfully")))
}
