//! Assignments and the grades students receive on them.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::{constraint, new_id, now, require};
use crate::{Database, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeStatus {
    Assigned,
    Completed,
    Late,
    Missing,
}

impl GradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeStatus::Assigned => "assigned",
            GradeStatus::Completed => "completed",
            GradeStatus::Late => "late",
            GradeStatus::Missing => "missing",
        }
    }
}

impl fmt::Display for GradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(GradeStatus::Assigned),
            "completed" => Ok(GradeStatus::Completed),
            "late" => Ok(GradeStatus::Late),
            "missing" => Ok(GradeStatus::Missing),
            other => Err(Error::Validation(format!("unknown grade status `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub due_date: NaiveDate,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub subject: String,
    pub due_date: NaiveDate,
}

impl NewAssignment {
    pub fn validate(&self) -> Result<(), Error> {
        require("title", &self.title)?;
        require("subject", &self.subject)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub assignment_id: String,
    pub score: Option<f64>,
    pub max_score: f64,
    pub status: GradeStatus,
    pub feedback: String,
    pub graded_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGrade {
    pub student_id: String,
    pub assignment_id: String,
    #[serde(default)]
    pub score: Option<f64>,
    pub max_score: f64,
    pub status: GradeStatus,
    #[serde(default)]
    pub feedback: String,
}

impl NewGrade {
    pub fn validate(&self) -> Result<(), Error> {
        require("student_id", &self.student_id)?;
        require("assignment_id", &self.assignment_id)?;
        if !(self.max_score.is_finite() && self.max_score > 0.0) {
            return Err(Error::Validation("max_score must be positive".into()));
        }
        match self.score {
            Some(score) if !(score.is_finite() && (0.0..=self.max_score).contains(&score)) => {
                Err(Error::Validation("score must be between 0 and max_score".into()))
            }
            _ => Ok(()),
        }
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const ASSIGNMENT_COLUMNS: &str = "id, title, description, subject, due_date, created_by, created_at, updated_at";
const GRADE_COLUMNS: &str =
    "id, student_id, assignment_id, score, max_score, status, feedback, graded_by, created_at, updated_at";

fn conversion(idx: usize, e: impl fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.to_string().into())
}

fn assignment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Assignment> {
    let due: String = row.get(4)?;
    Ok(Assignment {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        subject: row.get(3)?,
        due_date: NaiveDate::parse_from_str(&due, DATE_FORMAT).map_err(|e| conversion(4, e))?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn grade_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Grade> {
    let status: String = row.get(5)?;
    Ok(Grade {
        id: row.get(0)?,
        student_id: row.get(1)?,
        assignment_id: row.get(2)?,
        score: row.get(3)?,
        max_score: row.get(4)?,
        status: status.parse().map_err(|e: Error| conversion(5, e))?,
        feedback: row.get(6)?,
        graded_by: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn fetch_assignment(conn: &rusqlite::Connection, id: &str) -> Result<Option<Assignment>, Error> {
    let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], assignment_from_row).optional()?)
}

fn fetch_grade(conn: &rusqlite::Connection, id: &str) -> Result<Option<Grade>, Error> {
    let sql = format!("SELECT {GRADE_COLUMNS} FROM grades WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], grade_from_row).optional()?)
}

fn grades_where(conn: &rusqlite::Connection, column: &str, value: &str) -> Result<Vec<Grade>, Error> {
    let sql = format!("SELECT {GRADE_COLUMNS} FROM grades WHERE {column} = ?1 ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![value], grade_from_row)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    pub async fn create_assignment(&self, input: &NewAssignment, created_by: &str) -> Result<Assignment, Error> {
        input.validate()?;
        let ts = now();
        let assignment = Assignment {
            id: new_id(),
            title: input.title.trim().to_string(),
            description: input.description.clone(),
            subject: input.subject.trim().to_string(),
            due_date: input.due_date,
            created_by: created_by.to_string(),
            created_at: ts.clone(),
            updated_at: ts,
        };

        let row = assignment.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO assignments (id, title, description, subject, due_date, created_by, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.id,
                        row.title,
                        row.description,
                        row.subject,
                        row.due_date.format(DATE_FORMAT).to_string(),
                        row.created_by,
                        row.created_at,
                        row.updated_at,
                    ],
                )
                .map_err(|e| constraint(e, "assignment"))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(assignment)
    }

    pub async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Assignment>, Error> { fetch_assignment(conn, &id) })
            .await
            .map_err(Error::from)
    }

    /// All assignments by due date.
    pub async fn list_assignments(&self) -> Result<Vec<Assignment>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<Assignment>, Error> {
                let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments ORDER BY due_date, title");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], assignment_from_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn update_assignment(&self, id: &str, input: &NewAssignment) -> Result<Assignment, Error> {
        input.validate()?;
        let id = id.to_string();
        let input = input.clone();
        self.conn
            .call(move |conn| -> Result<Assignment, Error> {
                let changed = conn.execute(
                    "UPDATE assignments SET title = ?2, description = ?3, subject = ?4, due_date = ?5, updated_at = ?6
                     WHERE id = ?1",
                    params![
                        id,
                        input.title.trim(),
                        input.description,
                        input.subject.trim(),
                        input.due_date.format(DATE_FORMAT).to_string(),
                        now(),
                    ],
                )?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("assignment {id}")));
                }
                fetch_assignment(conn, &id)?.ok_or_else(|| Error::NotFound(format!("assignment {id}")))
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an assignment and every grade recorded against it.
    pub async fn delete_assignment(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                if conn.execute("DELETE FROM assignments WHERE id = ?1", params![id])? == 0 {
                    return Err(Error::NotFound(format!("assignment {id}")));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Record a grade. One grade per student per assignment.
    pub async fn create_grade(&self, input: &NewGrade, graded_by: &str) -> Result<Grade, Error> {
        input.validate()?;
        let ts = now();
        let grade = Grade {
            id: new_id(),
            student_id: input.student_id.clone(),
            assignment_id: input.assignment_id.clone(),
            score: input.score,
            max_score: input.max_score,
            status: input.status,
            feedback: input.feedback.clone(),
            graded_by: graded_by.to_string(),
            created_at: ts.clone(),
            updated_at: ts,
        };

        let row = grade.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO grades (id, student_id, assignment_id, score, max_score, status, feedback, graded_by, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        row.id,
                        row.student_id,
                        row.assignment_id,
                        row.score,
                        row.max_score,
                        row.status.as_str(),
                        row.feedback,
                        row.graded_by,
                        row.created_at,
                        row.updated_at,
                    ],
                )
                .map_err(|e| constraint(e, "grade"))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(grade)
    }

    pub async fn get_grade(&self, id: &str) -> Result<Option<Grade>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Grade>, Error> { fetch_grade(conn, &id) })
            .await
            .map_err(Error::from)
    }

    /// Update score, status and feedback. The student and assignment of a
    /// grade never change.
    pub async fn update_grade(&self, id: &str, input: &NewGrade, graded_by: &str) -> Result<Grade, Error> {
        input.validate()?;
        let id = id.to_string();
        let input = input.clone();
        let graded_by = graded_by.to_string();
        self.conn
            .call(move |conn| -> Result<Grade, Error> {
                let Some(existing) = fetch_grade(conn, &id)? else {
                    return Err(Error::NotFound(format!("grade {id}")));
                };
                if existing.student_id != input.student_id || existing.assignment_id != input.assignment_id {
                    return Err(Error::Validation("student_id and assignment_id cannot be changed".into()));
                }
                conn.execute(
                    "UPDATE grades SET score = ?2, max_score = ?3, status = ?4, feedback = ?5, graded_by = ?6, updated_at = ?7
                     WHERE id = ?1",
                    params![id, input.score, input.max_score, input.status.as_str(), input.feedback, graded_by, now()],
                )?;
                fetch_grade(conn, &id)?.ok_or_else(|| Error::NotFound(format!("grade {id}")))
            })
            .await
            .map_err(Error::from)
    }

    pub async fn grades_for_student(&self, student_id: &str) -> Result<Vec<Grade>, Error> {
        let student_id = student_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Grade>, Error> { grades_where(conn, "student_id", &student_id) })
            .await
            .map_err(Error::from)
    }

    pub async fn grades_for_assignment(&self, assignment_id: &str) -> Result<Vec<Grade>, Error> {
        let assignment_id = assignment_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Grade>, Error> { grades_where(conn, "assignment_id", &assignment_id) })
            .await
            .map_err(Error::from)
    }
}
