//! User accounts and parent/student links.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::{constraint, new_id, now, require};
use crate::auth::{hash_password, verify_password};
use crate::{Database, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Faculty,
    Staff,
    Parent,
}

impl Role {
    pub const ALL: &'static [Role] = &[Role::Faculty, Role::Staff, Role::Parent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Faculty => "faculty",
            Role::Staff => "staff",
            Role::Parent => "parent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faculty" => Ok(Role::Faculty),
            "staff" => Ok(Role::Staff),
            "parent" => Ok(Role::Parent),
            other => Err(Error::Validation(format!("unknown role `{other}`"))),
        }
    }
}

/// A user as exposed over the API. The password hash never leaves the
/// repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub student_ids: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Registration body.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(default)]
    pub student_ids: Vec<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), Error> {
        require("username", &self.username)?;
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)?;
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        validate_links(self.role, &self.student_ids)
    }
}

/// Full update body. `password` and `student_ids` are left unchanged when
/// omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct UserUpdate {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub student_ids: Option<Vec<String>>,
}

impl UserUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)?;
        validate_email(&self.email)?;
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        validate_links(self.role, self.student_ids.as_deref().unwrap_or_default())
    }
}

fn validate_email(email: &str) -> Result<(), Error> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(Error::Validation("email is not a valid address".into())),
    }
}

fn validate_password(password: &str) -> Result<(), Error> {
    if password.chars().count() < 8 {
        return Err(Error::Validation("password must be at least 8 characters".into()));
    }
    Ok(())
}

fn validate_links(role: Role, student_ids: &[String]) -> Result<(), Error> {
    if role != Role::Parent && !student_ids.is_empty() {
        return Err(Error::Validation("only parents can be linked to students".into()));
    }
    Ok(())
}

const COLUMNS: &str = "id, username, email, first_name, last_name, role, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(5)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.to_string().into()))?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        role,
        student_ids: Vec::new(),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn load_links(conn: &rusqlite::Connection, user: &mut User) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached("SELECT student_id FROM parent_student WHERE parent_id = ?1 ORDER BY student_id")?;
    user.student_ids = stmt
        .query_map(params![user.id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(())
}

fn replace_links(conn: &rusqlite::Connection, user_id: &str, student_ids: &[String]) -> Result<(), Error> {
    conn.execute("DELETE FROM parent_student WHERE parent_id = ?1", params![user_id])?;
    for student_id in student_ids {
        conn.execute(
            "INSERT OR IGNORE INTO parent_student (parent_id, student_id) VALUES (?1, ?2)",
            params![user_id, student_id],
        )
        .map_err(|e| constraint(e, "student link"))?;
    }
    Ok(())
}

pub(crate) fn fetch_user(conn: &rusqlite::Connection, id: &str) -> Result<Option<User>, Error> {
    let sql = format!("SELECT {COLUMNS} FROM users WHERE id = ?1");
    let Some(mut user) = conn.query_row(&sql, params![id], from_row).optional()? else {
        return Ok(None);
    };
    load_links(conn, &mut user)?;
    Ok(Some(user))
}

impl Database {
    /// Register a new account.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed input or unknown linked students,
    /// `Conflict` if the username or email is taken.
    pub async fn create_user(&self, input: &NewUser) -> Result<User, Error> {
        input.validate()?;
        let password_hash = hash_password(&input.password)?;
        let ts = now();
        let mut user = User {
            id: new_id(),
            username: input.username.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            role: input.role,
            student_ids: input.student_ids.clone(),
            created_at: ts.clone(),
            updated_at: ts,
        };
        user.student_ids.sort();
        user.student_ids.dedup();

        let row = user.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO users (id, username, email, password_hash, first_name, last_name, role, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        row.id,
                        row.username,
                        row.email,
                        password_hash,
                        row.first_name,
                        row.last_name,
                        row.role.as_str(),
                        row.created_at,
                        row.updated_at,
                    ],
                )
                .map_err(|e| constraint(e, "username or email"))?;
                replace_links(&tx, &row.id, &row.student_ids)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::info!(id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<User>, Error> { fetch_user(conn, &id) })
            .await
            .map_err(Error::from)
    }

    /// All users ordered by username.
    pub async fn list_users(&self) -> Result<Vec<User>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<User>, Error> {
                let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM users ORDER BY username"))?;
                let mut users = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
                for user in &mut users {
                    load_links(conn, user)?;
                }
                Ok(users)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn update_user(&self, id: &str, input: &UserUpdate) -> Result<User, Error> {
        input.validate()?;
        let password_hash = input.password.as_deref().map(hash_password).transpose()?;
        let id = id.to_string();
        let input = input.clone();
        self.conn
            .call(move |conn| -> Result<User, Error> {
                let tx = conn.transaction()?;
                let changed = tx
                    .execute(
                        "UPDATE users SET email = ?2, first_name = ?3, last_name = ?4, role = ?5, updated_at = ?6
                         WHERE id = ?1",
                        params![
                            id,
                            input.email.trim().to_lowercase(),
                            input.first_name.trim(),
                            input.last_name.trim(),
                            input.role.as_str(),
                            now(),
                        ],
                    )
                    .map_err(|e| constraint(e, "email"))?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("user {id}")));
                }

                if let Some(hash) = password_hash {
                    tx.execute("UPDATE users SET password_hash = ?2 WHERE id = ?1", params![id, hash])?;
                    tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![id])?;
                }
                if input.role != Role::Parent {
                    replace_links(&tx, &id, &[])?;
                } else if let Some(student_ids) = &input.student_ids {
                    replace_links(&tx, &id, student_ids)?;
                }

                let user = fetch_user(&tx, &id)?.ok_or_else(|| Error::NotFound(format!("user {id}")))?;
                tx.commit()?;
                Ok(user)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an account along with its sessions, links and forum content.
    pub async fn delete_user(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let changed = conn
                    .execute("DELETE FROM users WHERE id = ?1", params![id])
                    .map_err(|e| match constraint(e, "user") {
                        Error::Validation(_) => {
                            Error::Conflict(format!("user {id} still owns attendance, assignments or grades"))
                        }
                        other => other,
                    })?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("user {id}")));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Check a username/password pair.
    ///
    /// Returns None for an unknown username or a wrong password alike.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>, Error> {
        let username = username.trim().to_string();
        let found = self
            .conn
            .call(move |conn| -> Result<Option<(String, String)>, Error> {
                Ok(conn
                    .query_row(
                        "SELECT id, password_hash FROM users WHERE username = ?1",
                        params![username],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await
            .map_err(Error::from)?;

        let Some((id, hash)) = found else {
            return Ok(None);
        };
        if !verify_password(password, &hash) {
            return Ok(None);
        }
        self.get_user(&id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewStudent, migrated_db, new_user};

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("staff".parse::<Role>().unwrap(), Role::Staff);
        assert_eq!(Role::Faculty.to_string(), "faculty");
        assert!(matches!("admin".parse::<Role>(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_user_and_authenticate() {
        let db = migrated_db().await;
        let user = db.create_user(&new_user("mrsmith", Role::Faculty)).await.unwrap();
        assert_eq!(user.role, Role::Faculty);

        let ok = db.authenticate("mrsmith", "password123").await.unwrap().unwrap();
        assert_eq!(ok.id, user.id);
        assert!(db.authenticate("mrsmith", "wrong-password").await.unwrap().is_none());
        assert!(db.authenticate("nobody", "password123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let db = migrated_db().await;
        db.create_user(&new_user("dup", Role::Staff)).await.unwrap();
        let mut again = new_user("dup", Role::Staff);
        again.email = "other@school.test".into();
        assert!(matches!(db.create_user(&again).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_serialized_user_has_no_password() {
        let db = migrated_db().await;
        let user = db.create_user(&new_user("quiet", Role::Staff)).await.unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }

    #[tokio::test]
    async fn test_parent_links() {
        let db = migrated_db().await;
        let student = db.create_student(&NewStudent { name: "Kid".into(), age: 8, grade: 3 }).await.unwrap();

        let mut parent = new_user("mom", Role::Parent);
        parent.student_ids = vec![student.id.clone()];
        let created = db.create_user(&parent).await.unwrap();
        assert_eq!(db.get_user(&created.id).await.unwrap().unwrap().student_ids, vec![student.id.clone()]);

        let mut unknown = new_user("dad", Role::Parent);
        unknown.student_ids = vec!["missing".into()];
        assert!(matches!(db.create_user(&unknown).await, Err(Error::Validation(_))));

        let mut staff_with_kids = new_user("clerk", Role::Staff);
        staff_with_kids.student_ids = vec![student.id];
        assert!(matches!(db.create_user(&staff_with_kids).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_user_changes_password() {
        let db = migrated_db().await;
        let user = db.create_user(&new_user("changer", Role::Staff)).await.unwrap();
        let update = UserUpdate {
            email: "new@school.test".into(),
            first_name: "New".into(),
            last_name: "Name".into(),
            role: Role::Faculty,
            password: Some("another-secret".into()),
            student_ids: None,
        };
        let updated = db.update_user(&user.id, &update).await.unwrap();
        assert_eq!(updated.email, "new@school.test");
        assert_eq!(updated.role, Role::Faculty);
        assert!(db.authenticate("changer", "another-secret").await.unwrap().is_some());
        assert!(db.authenticate("changer", "password123").await.unwrap().is_none());

        assert!(matches!(db.update_user("missing", &update).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let db = migrated_db().await;
        let user = db.create_user(&new_user("gone", Role::Parent)).await.unwrap();
        db.delete_user(&user.id).await.unwrap();
        assert!(db.get_user(&user.id).await.unwrap().is_none());
        assert!(matches!(db.delete_user(&user.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_users() {
        let db = migrated_db().await;
        db.create_user(&new_user("zoe", Role::Staff)).await.unwrap();
        db.create_user(&new_user("adam", Role::Faculty)).await.unwrap();
        let names: Vec<String> = db.list_users().await.unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["adam", "zoe"]);
    }
}
