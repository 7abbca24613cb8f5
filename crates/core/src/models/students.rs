//! Student records.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::{constraint, new_id, now, require};
use crate::{Database, Error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub age: i64,
    pub grade: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Body of a create or full update.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub age: i64,
    pub grade: i64,
}

impl NewStudent {
    pub fn validate(&self) -> Result<(), Error> {
        require("name", &self.name)?;
        if !(1..=120).contains(&self.age) {
            return Err(Error::Validation("age must be between 1 and 120".into()));
        }
        if !(0..=12).contains(&self.grade) {
            return Err(Error::Validation("grade must be between 0 and 12".into()));
        }
        Ok(())
    }
}

const COLUMNS: &str = "id, name, age, grade, created_at, updated_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        grade: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl Database {
    pub async fn create_student(&self, input: &NewStudent) -> Result<Student, Error> {
        input.validate()?;
        let ts = now();
        let student = Student {
            id: new_id(),
            name: input.name.trim().to_string(),
            age: input.age,
            grade: input.grade,
            created_at: ts.clone(),
            updated_at: ts,
        };

        let row = student.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO students (id, name, age, grade, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![row.id, row.name, row.age, row.grade, row.created_at, row.updated_at],
                )
                .map_err(|e| constraint(e, "student"))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(id = %student.id, "student created");
        Ok(student)
    }

    /// Returns None if no student has this id.
    pub async fn get_student(&self, id: &str) -> Result<Option<Student>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Student>, Error> {
                let sql = format!("SELECT {COLUMNS} FROM students WHERE id = ?1");
                Ok(conn.query_row(&sql, params![id], from_row).optional()?)
            })
            .await
            .map_err(Error::from)
    }

    /// All students ordered by name.
    pub async fn list_students(&self) -> Result<Vec<Student>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<Student>, Error> {
                let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM students ORDER BY name, id"))?;
                let rows = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn update_student(&self, id: &str, input: &NewStudent) -> Result<Student, Error> {
        input.validate()?;
        let id = id.to_string();
        let name = input.name.trim().to_string();
        let (age, grade) = (input.age, input.grade);
        self.conn
            .call(move |conn| -> Result<Student, Error> {
                let changed = conn.execute(
                    "UPDATE students SET name = ?2, age = ?3, grade = ?4, updated_at = ?5 WHERE id = ?1",
                    params![id, name, age, grade, now()],
                )?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("student {id}")));
                }
                let sql = format!("SELECT {COLUMNS} FROM students WHERE id = ?1");
                Ok(conn.query_row(&sql, params![id], from_row)?)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a student; attendance, grades and forum posts cascade.
    pub async fn delete_student(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let changed = conn.execute("DELETE FROM students WHERE id = ?1", params![id])?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("student {id}")));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
