//! Parent/teacher forum: posts about a student and their comments.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::{constraint, new_id, now, require};
use crate::{Database, Error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub student_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub student_id: String,
}

impl NewPost {
    pub fn validate(&self) -> Result<(), Error> {
        require("title", &self.title)?;
        require("content", &self.content)?;
        require("student_id", &self.student_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumComment {
    pub id: String,
    pub post_id: String,
    pub content: String,
    pub author_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub content: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        require("content", &self.content)
    }
}

const POST_COLUMNS: &str = "id, title, content, author_id, student_id, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, post_id, content, author_id, created_at, updated_at";

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForumPost> {
    Ok(ForumPost {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        student_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForumComment> {
    Ok(ForumComment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn fetch_post(conn: &rusqlite::Connection, id: &str) -> Result<Option<ForumPost>, Error> {
    let sql = format!("SELECT {POST_COLUMNS} FROM forum_posts WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], post_from_row).optional()?)
}

fn fetch_comment(conn: &rusqlite::Connection, id: &str) -> Result<Option<ForumComment>, Error> {
    let sql = format!("SELECT {COMMENT_COLUMNS} FROM forum_comments WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], comment_from_row).optional()?)
}

impl Database {
    pub async fn create_post(&self, input: &NewPost, author_id: &str) -> Result<ForumPost, Error> {
        input.validate()?;
        let ts = now();
        let post = ForumPost {
            id: new_id(),
            title: input.title.trim().to_string(),
            content: input.content.clone(),
            author_id: author_id.to_string(),
            student_id: input.student_id.clone(),
            created_at: ts.clone(),
            updated_at: ts,
        };

        let row = post.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO forum_posts (id, title, content, author_id, student_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![row.id, row.title, row.content, row.author_id, row.student_id, row.created_at, row.updated_at],
                )
                .map_err(|e| constraint(e, "forum post"))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(post)
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<ForumPost>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ForumPost>, Error> { fetch_post(conn, &id) })
            .await
            .map_err(Error::from)
    }

    /// Edit title and content. The student a post is about never changes.
    pub async fn update_post(&self, id: &str, input: &NewPost) -> Result<ForumPost, Error> {
        input.validate()?;
        let id = id.to_string();
        let input = input.clone();
        self.conn
            .call(move |conn| -> Result<ForumPost, Error> {
                let changed = conn.execute(
                    "UPDATE forum_posts SET title = ?2, content = ?3, updated_at = ?4 WHERE id = ?1",
                    params![id, input.title.trim(), input.content, now()],
                )?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("forum post {id}")));
                }
                fetch_post(conn, &id)?.ok_or_else(|| Error::NotFound(format!("forum post {id}")))
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a post and its comments.
    pub async fn delete_post(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                if conn.execute("DELETE FROM forum_posts WHERE id = ?1", params![id])? == 0 {
                    return Err(Error::NotFound(format!("forum post {id}")));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Posts about a student, newest first.
    pub async fn posts_for_student(&self, student_id: &str) -> Result<Vec<ForumPost>, Error> {
        let student_id = student_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<ForumPost>, Error> {
                let sql = format!("SELECT {POST_COLUMNS} FROM forum_posts WHERE student_id = ?1 ORDER BY created_at DESC");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![student_id], post_from_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn create_comment(&self, post_id: &str, input: &NewComment, author_id: &str) -> Result<ForumComment, Error> {
        input.validate()?;
        let ts = now();
        let comment = ForumComment {
            id: new_id(),
            post_id: post_id.to_string(),
            content: input.content.clone(),
            author_id: author_id.to_string(),
            created_at: ts.clone(),
            updated_at: ts,
        };

        let row = comment.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                if fetch_post(conn, &row.post_id)?.is_none() {
                    return Err(Error::NotFound(format!("forum post {}", row.post_id)));
                }
                conn.execute(
                    "INSERT INTO forum_comments (id, post_id, content, author_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![row.id, row.post_id, row.content, row.author_id, row.created_at, row.updated_at],
                )
                .map_err(|e| constraint(e, "comment"))?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(comment)
    }

    pub async fn get_comment(&self, id: &str) -> Result<Option<ForumComment>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ForumComment>, Error> { fetch_comment(conn, &id) })
            .await
            .map_err(Error::from)
    }

    pub async fn update_comment(&self, id: &str, input: &NewComment) -> Result<ForumComment, Error> {
        input.validate()?;
        let id = id.to_string();
        let content = input.content.clone();
        self.conn
            .call(move |conn| -> Result<ForumComment, Error> {
                let changed = conn.execute(
                    "UPDATE forum_comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, content, now()],
                )?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("comment {id}")));
                }
                fetch_comment(conn, &id)?.ok_or_else(|| Error::NotFound(format!("comment {id}")))
            })
            .await
            .map_err(Error::from)
    }

    /// Comments on a post, oldest first. Unknown posts are `NotFound`.
    pub async fn comments_for_post(&self, post_id: &str) -> Result<Vec<ForumComment>, Error> {
        let post_id = post_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<ForumComment>, Error> {
                if fetch_post(conn, &post_id)?.is_none() {
                    return Err(Error::NotFound(format!("forum post {post_id}")));
                }
                let sql = format!("SELECT {COMMENT_COLUMNS} FROM forum_comments WHERE post_id = ?1 ORDER BY created_at, id");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![post_id], comment_from_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }
}
