//! Migration step discovery.
//!
//! A migration is a pair of SQL scripts named `<version>_<slug>.up.sql` and
//! `<version>_<slug>.down.sql`. Versions are unsigned integers; gaps are
//! allowed (timestamp prefixes) and application order is strictly by version.

use std::collections::BTreeMap;
use std::path::Path;

use crate::Error;

/// Built-in school schema, embedded at compile time.
///
/// All forward scripts are idempotent using CREATE IF NOT EXISTS.
const BUILTIN: &[(&str, &str)] = &[
    ("000001_create_students.up.sql", include_str!("../../migrations/000001_create_students.up.sql")),
    ("000001_create_students.down.sql", include_str!("../../migrations/000001_create_students.down.sql")),
    ("000002_create_users.up.sql", include_str!("../../migrations/000002_create_users.up.sql")),
    ("000002_create_users.down.sql", include_str!("../../migrations/000002_create_users.down.sql")),
    ("000003_create_attendance.up.sql", include_str!("../../migrations/000003_create_attendance.up.sql")),
    ("000003_create_attendance.down.sql", include_str!("../../migrations/000003_create_attendance.down.sql")),
    ("000004_create_grades.up.sql", include_str!("../../migrations/000004_create_grades.up.sql")),
    ("000004_create_grades.down.sql", include_str!("../../migrations/000004_create_grades.down.sql")),
    ("000005_create_forum.up.sql", include_str!("../../migrations/000005_create_forum.up.sql")),
    ("000005_create_forum.down.sql", include_str!("../../migrations/000005_create_forum.down.sql")),
];

/// A single paired forward/backward migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub version: u64,
    pub name: String,
    pub up: String,
    pub down: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Split a migration file name into `(version, slug, direction)`.
///
/// Returns `Ok(None)` for files that are not migration scripts at all.
fn parse_file_name(file_name: &str) -> Result<Option<(u64, &str, Direction)>, Error> {
    let (stem, direction) = if let Some(stem) = file_name.strip_suffix(".up.sql") {
        (stem, Direction::Up)
    } else if let Some(stem) = file_name.strip_suffix(".down.sql") {
        (stem, Direction::Down)
    } else {
        return Ok(None);
    };

    let (prefix, slug) = stem.split_once('_').unwrap_or((stem, ""));
    let version = prefix
        .parse::<u64>()
        .map_err(|_| Error::MigrationSource(format!("`{file_name}` does not start with a numeric version")))?;
    if version == 0 {
        return Err(Error::MigrationSource(format!("`{file_name}`: version 0 is reserved")));
    }

    Ok(Some((version, slug, direction)))
}

#[derive(Default)]
struct PartialStep {
    name: String,
    up: Option<String>,
    down: Option<String>,
}

/// Assemble ordered steps from `(file name, contents)` pairs.
///
/// # Errors
///
/// Returns `Error::MigrationSource` if a name has no numeric version, one
/// version is used with two different slugs or twice for one direction, or
/// a version lacks either its up or its down script.
pub fn collect<I, N, C>(files: I) -> Result<Vec<MigrationStep>, Error>
where
    I: IntoIterator<Item = (N, C)>,
    N: AsRef<str>,
    C: Into<String>,
{
    let mut partial: BTreeMap<u64, PartialStep> = BTreeMap::new();

    for (file_name, contents) in files {
        let file_name = file_name.as_ref();
        let Some((version, slug, direction)) = parse_file_name(file_name)? else {
            continue;
        };

        let entry = partial.entry(version).or_default();
        if entry.up.is_none() && entry.down.is_none() {
            entry.name = slug.to_string();
        } else if entry.name != slug {
            return Err(Error::MigrationSource(format!(
                "version {version} used by both `{}` and `{slug}`",
                entry.name
            )));
        }

        let slot = match direction {
            Direction::Up => &mut entry.up,
            Direction::Down => &mut entry.down,
        };
        if slot.is_some() {
            return Err(Error::MigrationSource(format!("duplicate script `{file_name}`")));
        }
        *slot = Some(contents.into());
    }

    partial
        .into_iter()
        .map(|(version, step)| match (step.up, step.down) {
            (Some(up), Some(down)) => Ok(MigrationStep { version, name: step.name, up, down }),
            (None, _) => Err(Error::MigrationSource(format!("version {version} has no .up.sql script"))),
            (_, None) => Err(Error::MigrationSource(format!("version {version} has no .down.sql script"))),
        })
        .collect()
}

/// Load the migrations embedded in the binary.
pub fn builtin() -> Result<Vec<MigrationStep>, Error> {
    collect(BUILTIN.iter().copied())
}

/// Discover migrations in a directory.
///
/// # Errors
///
/// Returns `Error::MigrationSource` if the directory or a script cannot be
/// read, or if the scripts do not form valid pairs.
pub fn from_dir(dir: impl AsRef<Path>) -> Result<Vec<MigrationStep>, Error> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::MigrationSource(format!("cannot read {}: {e}", dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::MigrationSource(format!("cannot read {}: {e}", dir.display())))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if parse_file_name(&file_name)?.is_none() {
            continue;
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::MigrationSource(format!("cannot read {}: {e}", path.display())))?;
        files.push((file_name, contents));
    }

    let steps = collect(files)?;
    tracing::debug!(dir = %dir.display(), count = steps.len(), "discovered migrations");
    Ok(steps)
}

/// Load from `dir` when given, otherwise the built-in set.
pub fn load(dir: Option<&Path>) -> Result<Vec<MigrationStep>, Error> {
    match dir {
        Some(dir) => from_dir(dir),
        None => builtin(),
    }
}
