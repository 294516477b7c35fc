//! Accounts, credentials and login sessions

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::core::cache::TtlCache;
use crate::core::config::AdminSeed;
use crate::core::error::{AppError, AppResult, FieldError};
use crate::core::storage::{is_unique_violation, Storage};
use crate::ledger::models::{PublicUser, Role, Session, User};
use crate::ledger::rate_limit::{self, AUTH_LIMIT};

#[cfg(not(test))]
const HASH_COST: u32 = 12;
// Lowest cost bcrypt accepts
#[cfg(test)]
const HASH_COST: u32 = 4;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref LETTER_RE: Regex = Regex::new(r"[a-zA-Z]").unwrap();
    static ref DIGIT_RE: Regex = Regex::new(r"[0-9]").unwrap();
}

/// Hash a password with a fresh salt
pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, HASH_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored hash; unreadable hashes never match
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Password rules shared by onboarding and reset
pub fn password_errors(password: &str) -> Vec<FieldError> {
    let password = password.trim();
    let mut errors = Vec::new();

    if password.chars().count() < 8 {
        errors.push(FieldError::new("password", "password must be at least 8 characters"));
    }
    if !LETTER_RE.is_match(password) {
        errors.push(FieldError::new("password", "password must contain a letter"));
    }
    if !DIGIT_RE.is_match(password) {
        errors.push(FieldError::new("password", "password must contain a number"));
    }
    errors
}

/// Trim an optional form value and drop it when blank
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

const USER_COLUMNS: &str =
    "id, full_name, email, password_hash, photo_url, role, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        photo_url: row.get(4)?,
        role: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) fn find_user_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [email], user_from_row).optional()?)
}

pub(crate) fn find_user_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [id], user_from_row).optional()?)
}

pub(crate) fn list_users_by_role(conn: &Connection, role: Role) -> AppResult<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE role = ?1 ORDER BY created_at",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map([role], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

/// Insert a new account; a taken email is reported as `already_registered`
pub(crate) fn insert_user(
    conn: &Connection,
    full_name: &str,
    email: &str,
    password_hash: String,
    photo_url: Option<String>,
    role: Role,
    now: DateTime<Utc>,
    already_registered: &str,
) -> AppResult<User> {
    let user = User {
        id: Uuid::new_v4().to_string(),
        full_name: full_name.to_string(),
        email: email.to_string(),
        password_hash,
        photo_url,
        role,
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO users (id, full_name, email, password_hash, photo_url, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user.id,
            user.full_name,
            user.email,
            user.password_hash,
            user.photo_url,
            user.role,
            user.created_at,
            user.updated_at
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::bad_request(already_registered)
        } else {
            AppError::from(e)
        }
    })?;

    Ok(user)
}

/// Login, session lookup and admin bootstrap
pub struct AccountService {
    storage: Arc<Storage>,
    cache: Arc<TtlCache>,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(storage: Arc<Storage>, cache: Arc<TtlCache>, session_ttl_days: i64) -> Self {
        Self {
            storage,
            cache,
            session_ttl: Duration::days(session_ttl_days),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Check credentials and open a session
    pub fn login(
        &self,
        email: Option<&str>,
        password: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<(PublicUser, Session)> {
        let (Some(email), Some(password)) = (non_blank(email), password.filter(|p| !p.is_empty()))
        else {
            return Err(AppError::bad_request("all field are required"));
        };

        let limit_key = rate_limit::auth_key(&email);
        rate_limit::hit(&self.cache, &limit_key, AUTH_LIMIT)?;

        let user = self
            .storage
            .with_conn(|conn| find_user_by_email(conn, &email))?
            .ok_or_else(|| AppError::not_found("user is not registered"))?;

        if !verify_password(password, &user.password_hash) {
            warn!("Failed login for {}", email);
            return Err(AppError::bad_request("password not matched"));
        }

        rate_limit::reset(&self.cache, &limit_key);

        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            user_id: user.id.clone(),
            expires_at: now + self.session_ttl,
        };
        self.storage.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![session.token, session.user_id, now, session.expires_at],
            )?;
            Ok(())
        })?;

        info!("User {} logged in", user.id);
        Ok((user.into(), session))
    }

    /// Resolve a session token to its account
    pub fn current_user(&self, token: Option<&str>, now: DateTime<Utc>) -> AppResult<PublicUser> {
        let unauthenticated = || AppError::unauthorized("unAuthentication access");
        let token = token.filter(|t| !t.is_empty()).ok_or_else(unauthenticated)?;

        self.storage.with_conn(|conn| {
            let session = conn
                .query_row(
                    "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
                    [token],
                    |row| {
                        Ok(Session {
                            token: row.get(0)?,
                            user_id: row.get(1)?,
                            expires_at: row.get(2)?,
                        })
                    },
                )
                .optional()?
                .ok_or_else(unauthenticated)?;

            if session.expires_at <= now {
                debug!("Session for user {} expired", session.user_id);
                conn.execute("DELETE FROM sessions WHERE token = ?1", [&session.token])?;
                return Err(unauthenticated());
            }

            let user = find_user_by_id(conn, &session.user_id)?.ok_or_else(unauthenticated)?;
            Ok(user.into())
        })
    }

    /// Resolve a session and require a role
    pub fn require_role(
        &self,
        token: Option<&str>,
        role: Role,
        now: DateTime<Utc>,
    ) -> AppResult<PublicUser> {
        let user = self.current_user(token, now)?;
        if user.role != role {
            warn!("User {} denied access to {} routes", user.id, role.as_str());
            return Err(AppError::unauthorized("unAuthorization access"));
        }
        Ok(user)
    }

    /// End a session; unknown tokens are ignored
    pub fn logout(&self, token: Option<&str>) -> AppResult<()> {
        if let Some(token) = token {
            self.storage.with_conn(|conn| {
                conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Create the configured administrator if the email is not yet registered
    pub fn ensure_admin(&self, seed: &AdminSeed, now: DateTime<Utc>) -> AppResult<bool> {
        let errors = password_errors(&seed.password);
        if !is_valid_email(&seed.email) || !errors.is_empty() {
            return Err(AppError::Validation {
                message: "invalid bootstrap admin credentials".to_string(),
                errors,
            });
        }

        let password_hash = hash_password(seed.password.trim())?;
        self.storage.with_conn(|conn| {
            if find_user_by_email(conn, &seed.email)?.is_some() {
                debug!("Admin {} already present", seed.email);
                return Ok(false);
            }

            insert_user(
                conn,
                &seed.full_name,
                &seed.email,
                password_hash,
                None,
                Role::Admin,
                now,
                "user is already registered",
            )?;
            info!("Created bootstrap admin {}", seed.email);
            Ok(true)
        })
    }
}
