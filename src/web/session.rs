//! Session cookie handling and role guards

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::HttpRequest;
use chrono::Utc;

use crate::core::error::AppResult;
use crate::ledger::models::{PublicUser, Role};
use crate::web::server::AppState;

/// Name of the cookie holding the session token
pub const TOKEN_COOKIE: &str = "token";

fn same_site(secure: bool) -> SameSite {
    // Browsers refuse SameSite=None without Secure
    if secure {
        SameSite::None
    } else {
        SameSite::Lax
    }
}

/// Cookie carrying a freshly issued session token
pub fn session_cookie(token: &str, ttl: chrono::Duration, secure: bool) -> Cookie<'static> {
    Cookie::build(TOKEN_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(same_site(secure))
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .finish()
}

/// Cookie that tells the browser to drop the session token
pub fn removal_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build(TOKEN_COOKIE, "")
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(same_site(secure))
        .finish();
    cookie.make_removal();
    cookie
}

/// Session token sent with the request, if any
pub fn token(req: &HttpRequest) -> Option<String> {
    req.cookie(TOKEN_COOKIE).map(|cookie| cookie.value().to_string())
}

/// Resolve the caller and require the admin role
pub fn require_admin(state: &AppState, req: &HttpRequest) -> AppResult<PublicUser> {
    state
        .accounts
        .require_role(token(req).as_deref(), Role::Admin, Utc::now())
}

/// Resolve the caller and require the supervisor role
pub fn require_supervisor(state: &AppState, req: &HttpRequest) -> AppResult<PublicUser> {
    state
        .accounts
        .require_role(token(req).as_deref(), Role::Supervisor, Utc::now())
}
