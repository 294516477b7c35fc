use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::info;

use crate::core::error::AppError;
use crate::web::models::{
    ApiResponse, EmailRequest, Empty, LoginRequest, ResetPasswordRequest, VerifyCodeRequest,
};
use crate::web::server::AppState;
use crate::web::session::{self, removal_cookie, session_cookie};

/// Get the account behind the session cookie
pub async fn get_user(
    data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let user = data
        .accounts
        .current_user(session::token(&req).as_deref(), Utc::now())?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, user, "user fetch successful")))
}

/// Check credentials and set the session cookie
pub async fn login(
    data: web::Data<AppState>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let (user, session) = data.accounts.login(
        request.email.as_deref(),
        request.password.as_deref(),
        Utc::now(),
    )?;

    let cookie = session_cookie(
        &session.token,
        data.accounts.session_ttl(),
        data.config.secure_cookies,
    );
    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(ApiResponse::new(200, user, "user loggedIn successfully")))
}

/// End the session and clear the cookie
pub async fn logout(
    data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    data.accounts.logout(session::token(&req).as_deref())?;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(data.config.secure_cookies))
        .json(ApiResponse::new(200, Empty {}, "user logout successfully")))
}

/// Send a password reset code
pub async fn forget_pass(
    data: web::Data<AppState>,
    request: web::Json<EmailRequest>,
) -> Result<HttpResponse, AppError> {
    data.recovery
        .forget_password(request.email.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, Empty {}, "otp sended")))
}

/// Verify a password reset code
pub async fn verify_pass(
    data: web::Data<AppState>,
    request: web::Json<VerifyCodeRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    let otp = request.otp.map(|otp| otp.into_string());
    data.recovery
        .verify_code(request.email.as_deref(), otp.as_deref())?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, Empty {}, "otp verified")))
}

/// Set a new password after verification
pub async fn reset_pass(
    data: web::Data<AppState>,
    request: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    data.recovery.reset_password(
        request.email.as_deref(),
        request.password.as_deref(),
        Utc::now(),
    )?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, Empty {}, "password reset successfully")))
}

/// Issue a new reset code
pub async fn resend_otp(
    data: web::Data<AppState>,
    request: web::Json<EmailRequest>,
) -> Result<HttpResponse, AppError> {
    data.recovery.resend_code(request.email.as_deref()).await?;
    info!("Reset code resent");

    Ok(HttpResponse::Ok().json(ApiResponse::new(200, Empty {}, "otp sended")))
}
