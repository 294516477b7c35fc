use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::core::error::AppError;
use crate::ledger::supervisors::{NewSupervisor, SupervisorUpdate};
use crate::web::models::ApiResponse;
use crate::web::server::AppState;
use crate::web::session::require_admin;

/// List all supervisors
pub async fn get_supervisors(
    data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    require_admin(&data, &req)?;
    let supervisors = data.supervisors.list()?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        supervisors,
        "supervisors fetched successfully",
    )))
}

/// Register a new supervisor
pub async fn add_supervisor(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<NewSupervisor>,
) -> Result<HttpResponse, AppError> {
    require_admin(&data, &req)?;
    let user = data.supervisors.add(request.into_inner(), Utc::now())?;

    Ok(HttpResponse::Created().json(ApiResponse::new(201, user, "user added successfully")))
}

/// Update a supervisor found by email
pub async fn edit_supervisor(
    data: web::Data<AppState>,
    req: HttpRequest,
    request: web::Json<SupervisorUpdate>,
) -> Result<HttpResponse, AppError> {
    require_admin(&data, &req)?;
    let user = data.supervisors.edit(request.into_inner(), Utc::now())?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, user, "user updated successfully")))
}

/// Remove a supervisor and everything they own
pub async fn delete_supervisor(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    require_admin(&data, &req)?;
    let supervisor_id = data.supervisors.delete(&path.into_inner())?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        supervisor_id,
        "supervisor delete successfully",
    )))
}
