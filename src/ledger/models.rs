//! Data models for the ledger
//!
//! Records as they are stored, plus the public views returned to clients.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Account roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Onboards and removes supervisors
    Admin,
    /// Manages a crew of workers
    Supervisor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supervisor => "supervisor",
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "admin" => Ok(Role::Admin),
            "supervisor" => Ok(Role::Supervisor),
            other => Err(FromSqlError::Other(format!("unknown role: {}", other).into())),
        }
    }
}

/// Stored account, including the password hash
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub photo_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            photo_url: user.photo_url,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Login session bound to the `token` cookie
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// A daily-wage worker on a supervisor's roster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: String,
    pub supervisor_id: String,
    pub full_name: String,
    pub phone_number: String,
    /// Pay for one standard day
    pub base_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attendance of one worker on one calendar day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkDay {
    pub id: String,
    pub worker_id: String,
    pub date: NaiveDate,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub leave_start: Option<DateTime<Utc>>,
    pub leave_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a worker stands within a day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    NotCheckedIn,
    Present,
    OnLeave,
    CheckedOut,
}

/// Payment state; only settled payments are recorded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
}

impl ToSql for PaymentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            PaymentStatus::Paid => Ok("paid".into()),
        }
    }
}

impl FromSql for PaymentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(FromSqlError::Other(
                format!("unknown payment status: {}", other).into(),
            )),
        }
    }
}

/// A settled pay period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub worker_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub base_rate: f64,
    pub total_days: u32,
    pub total_amount: f64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_user_hides_password() {
        let now = Utc::now();
        let user = User {
            id: "u1".to_string(),
            full_name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            password_hash: "$2b$04$saltsaltsaltsaltsaltsuhashhashhashhashhashhashhas".to_string(),
            photo_url: None,
            role: Role::Supervisor,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(PublicUser::from(user)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "supervisor");
        assert_eq!(json["fullName"], "Asha");
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(AttendanceStatus::NotCheckedIn).unwrap(),
            "not_checked_in"
        );
        assert_eq!(serde_json::to_value(PaymentStatus::Paid).unwrap(), "paid");
    }
}
