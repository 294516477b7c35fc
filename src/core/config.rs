use std::env;
use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use log::{info, warn};

use crate::core::error::{AppError, AppResult};
use crate::ledger::PayPolicy;

/// Service configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub host: String,
    /// Port the HTTP server binds to
    pub port: u16,
    /// SQLite database file
    pub database_path: String,
    /// Lifetime of a login session in days
    pub session_ttl_days: i64,
    /// Mark the session cookie `Secure` with `SameSite=None`
    pub secure_cookies: bool,
    /// Lifetime of a memoized payroll summary in seconds
    pub payroll_cache_ttl_secs: u64,
    /// Offset (minutes east of UTC) that decides which calendar day a punch belongs to
    pub workday_utc_offset_minutes: i32,
    /// Hours paid by one daily base rate
    pub standard_hours: f64,
    /// Pay factor applied to hours beyond the standard day
    pub overtime_multiplier: f64,
    /// Bootstrap administrator
    pub admin: Option<AdminSeed>,
}

/// Credentials for the administrator created at startup
#[derive(Clone)]
pub struct AdminSeed {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            database_path: "./data/laborledger.db".to_string(),
            session_ttl_days: 10,
            secure_cookies: true,
            payroll_cache_ttl_secs: 300,
            workday_utc_offset_minutes: 0,
            standard_hours: 8.0,
            overtime_multiplier: 1.5,
            admin: None,
        }
    }
}

impl AppConfig {
    /// Load the configuration from the environment, keeping defaults for unset variables
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                full_name: var("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
                email,
                password,
            }),
            (Some(_), None) | (None, Some(_)) => {
                warn!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together, skipping admin bootstrap");
                None
            }
            (None, None) => None,
        };

        let config = Self {
            host: load("HOST", defaults.host)?,
            port: load("PORT", defaults.port)?,
            database_path: load("DATABASE_PATH", defaults.database_path)?,
            session_ttl_days: load("SESSION_TTL_DAYS", defaults.session_ttl_days)?,
            secure_cookies: load("COOKIE_SECURE", defaults.secure_cookies)?,
            payroll_cache_ttl_secs: load("PAYROLL_CACHE_TTL_SECS", defaults.payroll_cache_ttl_secs)?,
            workday_utc_offset_minutes: load(
                "WORKDAY_UTC_OFFSET_MINUTES",
                defaults.workday_utc_offset_minutes,
            )?,
            standard_hours: load("STANDARD_HOURS", defaults.standard_hours)?,
            overtime_multiplier: load("OVERTIME_MULTIPLIER", defaults.overtime_multiplier)?,
            admin,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break session or payroll arithmetic
    pub fn validate(&self) -> AppResult<()> {
        if self.session_ttl_days <= 0 {
            return Err(AppError::Internal("SESSION_TTL_DAYS must be positive".to_string()));
        }
        if !(self.standard_hours > 0.0 && self.standard_hours <= 24.0) {
            return Err(AppError::Internal("STANDARD_HOURS must be within (0, 24]".to_string()));
        }
        if !(self.overtime_multiplier >= 1.0 && self.overtime_multiplier.is_finite()) {
            return Err(AppError::Internal("OVERTIME_MULTIPLIER must be at least 1".to_string()));
        }
        if self.workday_offset_checked().is_none() {
            return Err(AppError::Internal(
                "WORKDAY_UTC_OFFSET_MINUTES must be within +/- 24 hours".to_string(),
            ));
        }
        Ok(())
    }

    /// Offset used to turn a timestamp into a work day
    pub fn workday_offset(&self) -> FixedOffset {
        self.workday_offset_checked().unwrap_or_else(|| Utc.fix())
    }

    fn workday_offset_checked(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.workday_utc_offset_minutes.checked_mul(60)?)
    }

    /// Pay rules derived from the configuration
    pub fn pay_policy(&self) -> PayPolicy {
        PayPolicy {
            standard_hours: self.standard_hours,
            overtime_multiplier: self.overtime_multiplier,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn load<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|e| {
            warn!("Invalid {} value: {}", key, e);
            AppError::Internal(format!("invalid value for {}: {}", key, e))
        }),
        None => {
            info!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}
