//! Local identity provider: users, roles and Argon2id password hashes.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rusqlite::{Connection, OptionalExtension};

use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::model::{Identity, Role};

const MIN_PASSWORD_LEN: usize = 8;

fn hash_password(password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Internal(format!("failed to hash password: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("stored password hash is not in PHC format");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn check_password_strength(password: &str) -> StoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StoreError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        uid: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: row.get(3)?,
    })
}

pub fn user_count(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
}

/// Creates a user. Only administrators may do this, except for the very first
/// user of a workspace, which must be an administrator.
pub fn create_user(
    conn: &Connection,
    actor: Option<&Identity>,
    email: &str,
    password: &str,
    role: Role,
    display_name: &str,
) -> StoreResult<Identity> {
    match actor {
        Some(a) if a.is_admin() => {}
        Some(_) => return Err(StoreError::forbidden("only administrators can create users")),
        None => {
            if user_count(conn)? > 0 {
                return Err(StoreError::NotAuthenticated);
            }
            if role != Role::Admin {
                return Err(StoreError::forbidden(
                    "the first user of a workspace must be an administrator",
                ));
            }
        }
    }

    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(StoreError::validation("email must be an address"));
    }
    check_password_strength(password)?;
    let display_name = match display_name.trim() {
        "" => email.to_string(),
        s => s.to_string(),
    };
    let email_key = email.to_lowercase();

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email_key = ?", [&email_key], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_some() {
        return Err(StoreError::DuplicateName {
            entity: "user",
            name: email.to_string(),
        });
    }

    let id = db::new_id(None);
    let hash = hash_password(password)?;
    conn.execute(
        "INSERT INTO users(id, email, email_key, display_name, role, password_hash, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            email,
            &email_key,
            &display_name,
            role.as_str(),
            &hash,
            db::now(),
        ),
    )?;
    tracing::info!(user_id = %id, role = role.as_str(), "user created");

    Ok(Identity {
        uid: id,
        email: email.to_string(),
        display_name,
        role,
    })
}

pub fn authenticate(conn: &Connection, email: &str, password: &str) -> StoreResult<Identity> {
    let email_key = email.trim().to_lowercase();
    let row = conn
        .query_row(
            "SELECT id, email, display_name, role, password_hash FROM users WHERE email_key = ?",
            [&email_key],
            |r| Ok((row_to_identity(r)?, r.get::<_, String>(4)?)),
        )
        .optional()?;
    match row {
        Some((identity, hash)) if verify_password(password, &hash) => Ok(identity),
        _ => Err(StoreError::InvalidCredentials),
    }
}

pub fn change_password(
    conn: &Connection,
    uid: &str,
    old_password: &str,
    new_password: &str,
) -> StoreResult<()> {
    let hash: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM users WHERE id = ?",
            [uid],
            |r| r.get(0),
        )
        .optional()?;
    let Some(hash) = hash else {
        return Err(StoreError::NotFound("user"));
    };
    if !verify_password(old_password, &hash) {
        return Err(StoreError::WrongPassword);
    }
    check_password_strength(new_password)?;
    conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (hash_password(new_password)?, uid),
    )?;
    tracing::info!(user_id = %uid, "password changed");
    Ok(())
}

pub fn get_user(conn: &Connection, uid: &str) -> StoreResult<Identity> {
    conn.query_row(
        "SELECT id, email, display_name, role FROM users WHERE id = ?",
        [uid],
        row_to_identity,
    )
    .optional()?
    .ok_or(StoreError::NotFound("user"))
}

pub fn list_users(conn: &Connection, actor: &Identity) -> StoreResult<Vec<Identity>> {
    if !actor.is_admin() {
        return Err(StoreError::forbidden("only administrators can list users"));
    }
    let mut stmt = conn.prepare(
        "SELECT id, email, display_name, role FROM users ORDER BY email_key",
    )?;
    let users = stmt
        .query_map([], row_to_identity)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}
