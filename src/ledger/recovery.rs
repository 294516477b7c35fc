//! Password reset through short-lived one-time codes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::cache::TtlCache;
use crate::core::error::{AppError, AppResult};
use crate::core::storage::Storage;
use crate::ledger::accounts::{find_user_by_email, hash_password, non_blank, password_errors};
use crate::ledger::rate_limit::{self, AUTH_LIMIT, RESEND_COOLDOWN, RESEND_LIMIT};

/// Lifetime of an issued code, verified or not
pub const CODE_TTL: Duration = Duration::from_secs(5 * 60);

/// Delivers reset codes to account holders
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_code(&self, email: &str, code: &str) -> AppResult<()>;
}

/// Mailer that only writes to the log
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_reset_code(&self, email: &str, code: &str) -> AppResult<()> {
        info!("Password reset code issued for {}", email);
        debug!("Reset code for {}: {}", email, code);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CodeRecord {
    otp: String,
    verified: bool,
}

fn code_key(email: &str) -> String {
    format!("otp:{}", email)
}

fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Forgot-password flow: issue, verify, reset, resend
pub struct PasswordRecovery {
    storage: Arc<Storage>,
    cache: Arc<TtlCache>,
    mailer: Arc<dyn Mailer>,
}

impl PasswordRecovery {
    pub fn new(storage: Arc<Storage>, cache: Arc<TtlCache>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            storage,
            cache,
            mailer,
        }
    }

    /// Send a reset code to a registered email
    pub async fn forget_password(&self, email: Option<&str>) -> AppResult<()> {
        let email = non_blank(email).ok_or_else(|| AppError::bad_request("email are required"))?;

        rate_limit::hit(&self.cache, &rate_limit::auth_key(&email), AUTH_LIMIT)?;

        if self
            .storage
            .with_conn(|conn| find_user_by_email(conn, &email))?
            .is_none()
        {
            return Err(AppError::not_found("user is not registered"));
        }

        self.issue_code(&email).await
    }

    /// Mark the pending code for `email` as verified
    pub fn verify_code(&self, email: Option<&str>, otp: Option<&str>) -> AppResult<()> {
        let email = non_blank(email).ok_or_else(|| AppError::bad_request("email is required"))?;
        let otp = otp
            .map(str::trim)
            .filter(|otp| otp.chars().count() == 6)
            .ok_or_else(|| AppError::bad_request("otp is not matched"))?;

        let mut record = self.pending_code(&email)?;
        if record.otp != otp {
            return Err(AppError::bad_request("otp is not matched"));
        }

        record.verified = true;
        self.cache
            .set(&code_key(&email), serde_json::to_string(&record)?, Some(CODE_TTL));
        Ok(())
    }

    /// Replace the password once the code has been verified
    pub fn reset_password(
        &self,
        email: Option<&str>,
        password: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let email = non_blank(email).ok_or_else(|| AppError::bad_request("email is required"))?;

        let password = password.unwrap_or_default().trim();
        let errors = password_errors(password);
        if !errors.is_empty() {
            return Err(AppError::Validation {
                message: "entered wrong value".to_string(),
                errors,
            });
        }

        if !self.pending_code(&email)?.verified {
            return Err(AppError::bad_request("email is not verified"));
        }

        let hash = hash_password(password)?;
        self.storage.with_tx(|tx| {
            let user = find_user_by_email(tx, &email)?
                .ok_or_else(|| AppError::not_found("user is not registered"))?;

            tx.execute(
                "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![hash, now, user.id],
            )?;
            tx.execute("DELETE FROM sessions WHERE user_id = ?1", [&user.id])?;
            Ok(())
        })?;

        self.cache.del(&code_key(&email));
        info!("Password reset for {}", email);
        Ok(())
    }

    /// Issue a fresh code, subject to the cooldown and resend limit
    pub async fn resend_code(&self, email: Option<&str>) -> AppResult<()> {
        let email = non_blank(email).ok_or_else(|| AppError::bad_request("email is required"))?;

        rate_limit::check_cooldown(&self.cache, &rate_limit::cooldown_key(&email))?;
        rate_limit::hit(&self.cache, &rate_limit::resend_key(&email), RESEND_LIMIT)?;

        self.issue_code(&email).await
    }

    fn pending_code(&self, email: &str) -> AppResult<CodeRecord> {
        let raw = self
            .cache
            .get(&code_key(email))
            .ok_or_else(|| AppError::bad_request("time expired"))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn issue_code(&self, email: &str) -> AppResult<()> {
        let record = CodeRecord {
            otp: generate_code(),
            verified: false,
        };
        self.cache
            .set(&code_key(email), serde_json::to_string(&record)?, Some(CODE_TTL));

        self.mailer.send_reset_code(email, &record.otp).await?;

        rate_limit::start_cooldown(&self.cache, &rate_limit::cooldown_key(email), RESEND_COOLDOWN);
        Ok(())
    }
}
