use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::{parse_timestamp, parse_uuid, timestamp_str, DatabaseError};
use crate::models::enums::Role;
use crate::models::*;

/// A user row together with its password material, for login only.
pub struct StoredCredentials {
    pub user: User,
    pub password_hash: Vec<u8>,
    pub password_salt: Vec<u8>,
}

pub fn insert_user(
    conn: &Connection,
    email: &str,
    full_name: Option<&str>,
    password_hash: &[u8],
    password_salt: &[u8],
) -> Result<User, DatabaseError> {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: email.trim().to_lowercase(),
        full_name: full_name.map(str::to_string),
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO users (id, email, full_name, password_hash, password_salt, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            user.id.to_string(),
            user.email,
            user.full_name,
            password_hash,
            password_salt,
            timestamp_str(&now),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(format!("email already registered: {}", user.email))
        }
        other => other.into(),
    })?;
    Ok(user)
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, email, full_name, created_at, updated_at FROM users WHERE id = ?1",
        params![id.to_string()],
        UserRow::read,
    );
    match result {
        Ok(row) => Ok(Some(row.into_user()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_credentials_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<StoredCredentials>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, email, full_name, created_at, updated_at, password_hash, password_salt
         FROM users WHERE email = ?1",
        params![email.trim().to_lowercase()],
        |row| {
            Ok((
                UserRow::read(row)?,
                row.get::<_, Vec<u8>>(5)?,
                row.get::<_, Vec<u8>>(6)?,
            ))
        },
    );
    match result {
        Ok((row, password_hash, password_salt)) => Ok(Some(StoredCredentials {
            user: row.into_user()?,
            password_hash,
            password_salt,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

/// All users with their resolved role, oldest account first.
pub fn list_users_with_roles(conn: &Connection) -> Result<Vec<UserWithRole>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.email, u.full_name, u.created_at, u.updated_at, r.role
         FROM users u LEFT JOIN user_roles r ON r.user_id = u.id
         ORDER BY u.created_at ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((UserRow::read(row)?, row.get::<_, Option<String>>(5)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(row, role)| {
            Ok(UserWithRole {
                user: row.into_user()?,
                role: role_or_default(role)?,
            })
        })
        .collect()
}

/// Resolve a user's role. No assignment row means viewer.
pub fn get_role(conn: &Connection, user_id: &Uuid) -> Result<Role, DatabaseError> {
    let result = conn.query_row(
        "SELECT role FROM user_roles WHERE user_id = ?1",
        params![user_id.to_string()],
        |row| row.get::<_, String>(0),
    );
    match result {
        Ok(role) => Ok(Role::from_str(&role)?),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Role::Viewer),
        Err(e) => Err(e.into()),
    }
}

pub fn set_role(conn: &Connection, user_id: &Uuid, role: Role) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO user_roles (user_id, role) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
        params![user_id.to_string(), role.as_str()],
    )?;
    conn.execute(
        "UPDATE users SET updated_at = ?2 WHERE id = ?1",
        params![user_id.to_string(), timestamp_str(&Utc::now())],
    )?;
    Ok(())
}

fn role_or_default(role: Option<String>) -> Result<Role, DatabaseError> {
    match role {
        Some(r) => Ok(Role::from_str(&r)?),
        None => Ok(Role::Viewer),
    }
}

// ═══════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════

pub fn insert_session(
    conn: &Connection,
    token_hash: &[u8],
    user_id: &Uuid,
    created_at: &DateTime<Utc>,
    expires_at: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            token_hash,
            user_id.to_string(),
            timestamp_str(created_at),
            timestamp_str(expires_at),
        ],
    )?;
    Ok(())
}

/// The user owning an unexpired session, if any.
pub fn get_session_user(
    conn: &Connection,
    token_hash: &[u8],
    now: &DateTime<Utc>,
) -> Result<Option<Uuid>, DatabaseError> {
    let result = conn.query_row(
        "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
        params![token_hash],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    );
    match result {
        Ok((user_id, expires_at)) => {
            if parse_timestamp(&expires_at)? <= *now {
                return Ok(None);
            }
            Ok(Some(parse_uuid(&user_id)?))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_session(conn: &Connection, token_hash: &[u8]) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        params![token_hash],
    )?;
    Ok(rows > 0)
}

pub fn purge_expired_sessions(conn: &Connection, now: &DateTime<Utc>) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![timestamp_str(now)],
    )?)
}

struct UserRow {
    id: String,
    email: String,
    full_name: Option<String>,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_user(self) -> Result<User, DatabaseError> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            email: self.email,
            full_name: self.full_name,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::Duration;

    #[test]
    fn role_defaults_to_viewer() {
        let conn = open_memory_database().unwrap();
        let user = insert_user(&conn, "a@example.com", Some("Ada"), b"h", b"s").unwrap();
        assert_eq!(get_role(&conn, &user.id).unwrap(), Role::Viewer);

        set_role(&conn, &user.id, Role::Reviewer).unwrap();
        assert_eq!(get_role(&conn, &user.id).unwrap(), Role::Reviewer);

        set_role(&conn, &user.id, Role::Admin).unwrap();
        assert_eq!(get_role(&conn, &user.id).unwrap(), Role::Admin);
    }

    #[test]
    fn duplicate_email_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        insert_user(&conn, "a@example.com", None, b"h", b"s").unwrap();
        let err = insert_user(&conn, "A@Example.com", None, b"h", b"s").unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn credentials_lookup_is_case_insensitive() {
        let conn = open_memory_database().unwrap();
        insert_user(&conn, "a@example.com", None, b"hash", b"salt").unwrap();
        let creds = get_credentials_by_email(&conn, "A@EXAMPLE.COM").unwrap().unwrap();
        assert_eq!(creds.password_hash, b"hash");
        assert_eq!(creds.password_salt, b"salt");
        assert!(get_credentials_by_email(&conn, "b@example.com").unwrap().is_none());
    }

    #[test]
    fn list_users_resolves_roles() {
        let conn = open_memory_database().unwrap();
        let admin = insert_user(&conn, "admin@example.com", None, b"h", b"s").unwrap();
        insert_user(&conn, "plain@example.com", None, b"h", b"s").unwrap();
        set_role(&conn, &admin.id, Role::Admin).unwrap();

        let users = list_users_with_roles(&conn).unwrap();
        assert_eq!(users.len(), 2);
        let plain = users.iter().find(|u| u.user.email == "plain@example.com").unwrap();
        assert_eq!(plain.role, Role::Viewer);
        let admin_row = users.iter().find(|u| u.user.id == admin.id).unwrap();
        assert_eq!(admin_row.role, Role::Admin);
    }

    #[test]
    fn expired_session_resolves_to_none() {
        let conn = open_memory_database().unwrap();
        let user = insert_user(&conn, "a@example.com", None, b"h", b"s").unwrap();
        let now = Utc::now();
        insert_session(&conn, b"live", &user.id, &now, &(now + Duration::hours(1))).unwrap();
        insert_session(&conn, b"dead", &user.id, &now, &(now - Duration::seconds(1))).unwrap();

        assert_eq!(get_session_user(&conn, b"live", &now).unwrap(), Some(user.id));
        assert_eq!(get_session_user(&conn, b"dead", &now).unwrap(), None);
        assert_eq!(purge_expired_sessions(&conn, &now).unwrap(), 1);
        assert!(delete_session(&conn, b"live").unwrap());
        assert_eq!(get_session_user(&conn, b"live", &now).unwrap(), None);
    }
}
