//! Creating empty migration pairs for developers to fill in.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::Error;

/// Files written by [`create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldedMigration {
    pub version: u64,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
}

/// Lower-case the name and collapse every run of non-alphanumeric
/// characters into a single underscore.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// Create `<YYYYMMDDHHMMSS>_<slug>.up.sql` and `.down.sql` in `dir`.
///
/// Both files carry a short header naming the migration and its creation
/// time. Existing files are never overwritten.
///
/// # Errors
///
/// Returns `Error::Scaffold` if the name has no usable characters, either
/// file already exists, or the directory is not writable.
pub fn create(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<ScaffoldedMigration, Error> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(Error::Scaffold(format!("`{name}` is not a usable migration name")));
    }

    let stamp = now.format("%Y%m%d%H%M%S").to_string();
    let version = stamp
        .parse::<u64>()
        .map_err(|e| Error::Scaffold(format!("invalid timestamp version {stamp}: {e}")))?;

    std::fs::create_dir_all(dir).map_err(|e| Error::Scaffold(format!("cannot create {}: {e}", dir.display())))?;

    let up_path = dir.join(format!("{stamp}_{slug}.up.sql"));
    let down_path = dir.join(format!("{stamp}_{slug}.down.sql"));
    for path in [&up_path, &down_path] {
        if path.exists() {
            return Err(Error::Scaffold(format!("{} already exists", path.display())));
        }
    }

    let created = now.to_rfc3339();
    write_new(&up_path, &format!("-- Migration: {name}\n-- Created: {created}\n\n"))?;
    if let Err(e) = write_new(&down_path, &format!("-- Rollback: {name}\n-- Created: {created}\n\n")) {
        let _ = std::fs::remove_file(&up_path);
        return Err(e);
    }

    tracing::info!(version, up = %up_path.display(), down = %down_path.display(), "created migration");
    Ok(ScaffoldedMigration { version, up_path, down_path })
}

fn write_new(path: &Path, contents: &str) -> Result<(), Error> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| Error::Scaffold(format!("cannot create {}: {e}", path.display())))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| Error::Scaffold(format!("cannot write {}: {e}", path.display())))
}
