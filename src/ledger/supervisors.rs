//! Supervisor onboarding, done by administrators

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::core::error::{AppError, AppResult, FieldError};
use crate::core::storage::Storage;
use crate::ledger::accounts::{
    find_user_by_email, find_user_by_id, hash_password, insert_user, is_valid_email,
    list_users_by_role, non_blank, password_errors,
};
use crate::ledger::models::{PublicUser, Role};

/// Details for a new supervisor account
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSupervisor {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub photo_url: Option<String>,
}

/// Changes to a supervisor, addressed by email
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Roster entry shown to administrators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorSummary {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub photo_url: Option<String>,
}

pub struct SupervisorAdmin {
    storage: Arc<Storage>,
}

impl SupervisorAdmin {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Register a supervisor account
    pub fn add(&self, new: NewSupervisor, now: DateTime<Utc>) -> AppResult<PublicUser> {
        let full_name = non_blank(new.full_name.as_deref());
        let email = non_blank(new.email.as_deref());
        let password = new.password.as_deref().unwrap_or_default().trim().to_string();

        let mut errors = Vec::new();
        if full_name.is_none() {
            errors.push(FieldError::new("fullName", "fullName is required"));
        }
        match &email {
            None => errors.push(FieldError::new("email", "email is required")),
            Some(email) if !is_valid_email(email) => {
                errors.push(FieldError::new("email", "unvalid email"))
            }
            Some(_) => {}
        }
        errors.extend(password_errors(&password));

        let (Some(full_name), Some(email)) = (full_name, email) else {
            return Err(invalid(errors));
        };
        if !errors.is_empty() {
            return Err(invalid(errors));
        }

        let photo_url = non_blank(new.photo_url.as_deref());
        let password_hash = hash_password(&password)?;
        let user = self.storage.with_conn(|conn| {
            if find_user_by_email(conn, &email)?.is_some() {
                return Err(AppError::bad_request("user is already registered"));
            }
            insert_user(
                conn,
                &full_name,
                &email,
                password_hash,
                photo_url,
                Role::Supervisor,
                now,
                "user is already registered",
            )
        })?;

        info!("Supervisor {} added", user.id);
        Ok(user.into())
    }

    /// All supervisors, oldest first
    pub fn list(&self) -> AppResult<Vec<SupervisorSummary>> {
        let users = self
            .storage
            .with_conn(|conn| list_users_by_role(conn, Role::Supervisor))?;

        Ok(users
            .into_iter()
            .map(|user| SupervisorSummary {
                id: user.id,
                full_name: user.full_name,
                email: user.email,
                photo_url: user.photo_url,
            })
            .collect())
    }

    /// Update a supervisor's name and/or photo
    pub fn edit(&self, update: SupervisorUpdate, now: DateTime<Utc>) -> AppResult<PublicUser> {
        let email = non_blank(update.email.as_deref())
            .ok_or_else(|| AppError::bad_request("email must be required"))?;

        self.storage.with_conn(|conn| {
            let mut user = find_user_by_email(conn, &email)?
                .filter(|user| user.role == Role::Supervisor)
                .ok_or_else(|| AppError::not_found("supervisor is not found"))?;

            if let Some(full_name) = non_blank(update.full_name.as_deref()) {
                user.full_name = full_name;
            }
            if let Some(photo_url) = non_blank(update.photo_url.as_deref()) {
                user.photo_url = Some(photo_url);
            }
            user.updated_at = now;

            conn.execute(
                "UPDATE users SET full_name = ?1, photo_url = ?2, updated_at = ?3 WHERE id = ?4",
                params![user.full_name, user.photo_url, user.updated_at, user.id],
            )?;
            Ok(user.into())
        })
    }

    /// Remove a supervisor together with their sessions and crew
    pub fn delete(&self, supervisor_id: &str) -> AppResult<String> {
        if supervisor_id.trim().is_empty() {
            return Err(AppError::bad_request("supervisorId is required"));
        }

        self.storage.with_conn(|conn| {
            find_user_by_id(conn, supervisor_id)?
                .filter(|user| user.role == Role::Supervisor)
                .ok_or_else(|| AppError::not_found("supervisor is not found"))?;

            conn.execute("DELETE FROM users WHERE id = ?1", [supervisor_id])?;
            Ok(())
        })?;

        info!("Supervisor {} deleted", supervisor_id);
        Ok(supervisor_id.to_string())
    }
}

fn invalid(errors: Vec<FieldError>) -> AppError {
    AppError::Validation {
        message: "entered invalid value".to_string(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> SupervisorAdmin {
        SupervisorAdmin::new(Arc::new(Storage::open_in_memory().unwrap()))
    }

    fn new_supervisor(email: &str) -> NewSupervisor {
        NewSupervisor {
            full_name: Some("Ravi Kumar".to_string()),
            email: Some(email.to_string()),
            password: Some("sitepass1".to_string()),
            photo_url: Some("https://img.example.com/ravi.png".to_string()),
        }
    }

    #[test]
    fn test_add_and_list() {
        let admin = admin();
        let user = admin.add(new_supervisor("ravi@example.com"), Utc::now()).unwrap();
        assert_eq!(user.role, Role::Supervisor);

        let all = admin.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].email, "ravi@example.com");
        assert_eq!(all[0].photo_url.as_deref(), Some("https://img.example.com/ravi.png"));
    }

    #[test]
    fn test_add_validates_fields() {
        let admin = admin();
        let result = admin.add(
            NewSupervisor {
                full_name: Some("  ".to_string()),
                email: Some("not-an-email".to_string()),
                password: Some("short".to_string()),
                photo_url: None,
            },
            Utc::now(),
        );

        match result {
            Err(AppError::Validation { errors, .. }) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"fullName"));
                assert!(fields.contains(&"email"));
                assert!(fields.contains(&"password"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let admin = admin();
        admin.add(new_supervisor("ravi@example.com"), Utc::now()).unwrap();
        assert!(matches!(
            admin.add(new_supervisor("ravi@example.com"), Utc::now()),
            Err(AppError::BadRequest(msg)) if msg == "user is already registered"
        ));
    }

    #[test]
    fn test_edit_updates_name_only_when_given() {
        let admin = admin();
        admin.add(new_supervisor("ravi@example.com"), Utc::now()).unwrap();

        let edited = admin
            .edit(
                SupervisorUpdate {
                    email: Some("ravi@example.com".to_string()),
                    full_name: Some("Ravi K.".to_string()),
                    photo_url: None,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(edited.full_name, "Ravi K.");
        assert!(edited.photo_url.is_some());

        assert!(matches!(
            admin.edit(SupervisorUpdate::default(), Utc::now()),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            admin.edit(
                SupervisorUpdate {
                    email: Some("ghost@example.com".to_string()),
                    ..Default::default()
                },
                Utc::now()
            ),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete() {
        let admin = admin();
        let user = admin.add(new_supervisor("ravi@example.com"), Utc::now()).unwrap();

        assert_eq!(admin.delete(&user.id).unwrap(), user.id);
        assert!(admin.list().unwrap().is_empty());
        assert!(matches!(admin.delete(&user.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_delete_removes_roster_and_history() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let admin = SupervisorAdmin::new(storage.clone());
        let user = admin.add(new_supervisor("ravi@example.com"), Utc::now()).unwrap();

        let now = Utc::now();
        storage
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES ('t1', ?1, ?2, ?2)",
                    rusqlite::params![user.id, now],
                )?;
                conn.execute(
                    "INSERT INTO workers (id, supervisor_id, full_name, phone_number, base_rate, created_at, updated_at)
                     VALUES ('w1', ?1, 'Meena', '9000000001', 800.0, ?2, ?2)",
                    rusqlite::params![user.id, now],
                )?;
                conn.execute(
                    "INSERT INTO work_days (id, worker_id, work_date, check_in, check_out, created_at, updated_at)
                     VALUES ('d1', 'w1', ?1, ?2, ?2, ?2, ?2)",
                    rusqlite::params![now.date_naive(), now],
                )?;
                conn.execute(
                    "INSERT INTO payments (id, worker_id, period_start, period_end, base_rate, total_days, total_amount, created_at)
                     VALUES ('p1', 'w1', ?1, ?1, 800.0, 1, 800.0, ?2)",
                    rusqlite::params![now.date_naive(), now],
                )?;
                Ok(())
            })
            .unwrap();

        admin.delete(&user.id).unwrap();

        let remaining: Vec<i64> = storage
            .with_conn(|conn| {
                ["sessions", "workers", "work_days", "payments"]
                    .iter()
                    .map(|table| -> AppResult<i64> {
                        let sql = format!("SELECT COUNT(*) FROM {}", table);
                        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
                    })
                    .collect()
            })
            .unwrap();
        assert_eq!(remaining, vec![0, 0, 0, 0]);
    }
}
