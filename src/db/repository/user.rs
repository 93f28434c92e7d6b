use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::models::UserAccount;

use super::uuid_column;

/// Stored credential material for one login.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub account: UserAccount,
    pub password_hash: String,
    pub salt: String,
}

pub fn insert_user(
    conn: &Connection,
    account: &UserAccount,
    password_hash: &str,
    salt: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, email, password_hash, salt, role) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            account.id.to_string(),
            account.email.to_lowercase(),
            password_hash,
            salt,
            account.role,
        ],
    )?;
    Ok(())
}

/// Email lookup is case-insensitive; addresses are stored lowercased.
pub fn get_credentials_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<StoredCredentials>, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT id, email, role, password_hash, salt FROM users WHERE email = ?1",
            params![email.trim().to_lowercase()],
            |row| {
                Ok(StoredCredentials {
                    account: UserAccount {
                        id: uuid_column(row, 0)?,
                        email: row.get(1)?,
                        role: row.get::<_, Role>(2)?,
                    },
                    password_hash: row.get(3)?,
                    salt: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}
