//! Profile records: the identity table every other record references.

use crate::{new_record_id, StoreError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A registered identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    /// Public record id.
    pub id: String,
    /// External authentication subject this profile belongs to.
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Option<String>,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for creating a new profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProfileParams {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

/// Creates a new profile and returns the stored record.
pub fn create_profile(
    conn: &Connection,
    params: &CreateProfileParams,
) -> Result<Profile, StoreError> {
    let id = new_record_id();
    let profile = conn.query_row(
        "INSERT INTO profiles (id, user_id, email, full_name, role)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, user_id, email, full_name, role, created_at, updated_at",
        params![
            id,
            params.user_id,
            params.email,
            params.full_name,
            params.role,
        ],
        map_row_to_profile,
    )?;
    Ok(profile)
}

/// Retrieves a profile by its record id.
pub fn get_profile(conn: &Connection, id: &str) -> Result<Profile, StoreError> {
    conn.query_row(
        "SELECT id, user_id, email, full_name, role, created_at, updated_at
         FROM profiles WHERE id = ?1",
        [id],
        map_row_to_profile,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("profile {id}")))
}

/// Resolves the profile for an authenticated user.
///
/// This is the identity-resolution half of the two-step write protocol:
/// callers resolve the profile first, then write records referencing it.
/// An unresolvable identity is `NotFound` and must not be retried.
pub fn find_profile_by_user(conn: &Connection, user_id: &str) -> Result<Profile, StoreError> {
    conn.query_row(
        "SELECT id, user_id, email, full_name, role, created_at, updated_at
         FROM profiles WHERE user_id = ?1",
        [user_id],
        map_row_to_profile,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("profile for user {user_id}")))
}

fn map_row_to_profile(row: &Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plenum_db::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        run_migrations(&conn).expect("failed to run migrations");
        conn
    }

    #[test]
    fn create_and_resolve_profile() {
        let conn = setup_db();
        let created = create_profile(
            &conn,
            &CreateProfileParams {
                user_id: "auth-1".to_string(),
                email: "mod@example.com".to_string(),
                full_name: Some("Morgan".to_string()),
                role: Some("moderator".to_string()),
            },
        )
        .expect("create failed");

        let by_id = get_profile(&conn, &created.id).expect("get failed");
        assert_eq!(by_id, created);

        let by_user = find_profile_by_user(&conn, "auth-1").expect("resolve failed");
        assert_eq!(by_user.id, created.id);
    }

    #[test]
    fn missing_identity_is_not_found() {
        let conn = setup_db();
        let err = find_profile_by_user(&conn, "nobody").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn duplicate_user_id_rejected() {
        let conn = setup_db();
        let params = CreateProfileParams {
            user_id: "auth-1".to_string(),
            email: "a@example.com".to_string(),
            full_name: None,
            role: None,
        };
        create_profile(&conn, &params).expect("first create failed");
        let err = create_profile(&conn, &params).unwrap_err();
        assert!(err.is_constraint_violation());
    }
}
