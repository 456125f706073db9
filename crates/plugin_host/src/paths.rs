//! Path handling for plugin modules and plugin data directories.
//!
//! Everything here that decides whether a path is allowed works lexically and
//! never touches the filesystem; only [`migrate_dir`] performs I/O.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{PluginError, Result};

/// Directory name used when a plugin name sanitizes to nothing.
pub const DEFAULT_DIR_NAME: &str = "plugin";

/// Converts a plugin name into a filesystem-safe directory name.
///
/// The result is lowercase and contains only `[a-z0-9._-]`; every other
/// character (whitespace included) becomes `-`. Leading and trailing `-`, `.`
/// and `_` are trimmed, and an empty result falls back to [`DEFAULT_DIR_NAME`].
/// Sanitizing an already sanitized name returns it unchanged.
///
/// ```
/// use plugin_host::paths::sanitize_name;
///
/// assert_eq!(sanitize_name("My Cool Plugin!"), "my-cool-plugin");
/// assert_eq!(sanitize_name("../.."), "plugin");
/// ```
pub fn sanitize_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();

    let trimmed = mapped.trim_matches(|c| matches!(c, '-' | '.' | '_'));
    if trimmed.is_empty() {
        DEFAULT_DIR_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lexically normalizes a path: drops `.` components and folds `..` into
/// the preceding component where possible.
///
/// `..` directly under a root is dropped, as there is nothing above the root.
/// Leading `..` components of a relative path are kept.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Resolves `relative` inside `root`, refusing anything that would leave it.
///
/// Fails with [`PluginError::AbsoluteDataPath`] for absolute or rooted input
/// and with [`PluginError::DataPathEscape`] when the cleaned result is not
/// below `root`. An empty path or `.` resolves to `root` itself.
pub fn resolve_within(root: &Path, relative: &Path) -> Result<PathBuf> {
    if relative.is_absolute() || relative.has_root() {
        return Err(PluginError::AbsoluteDataPath(relative.to_path_buf()));
    }
    if matches!(relative.components().next(), Some(Component::Prefix(_))) {
        return Err(PluginError::AbsoluteDataPath(relative.to_path_buf()));
    }

    let root = clean_path(root);
    let joined = clean_path(&root.join(relative));

    match joined.strip_prefix(&root) {
        Ok(rest) if !starts_with_parent(rest) => Ok(joined),
        _ => Err(PluginError::DataPathEscape(relative.to_path_buf())),
    }
}

fn starts_with_parent(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::ParentDir))
}

/// Moves the contents of `from` into `to`.
///
/// * `from` missing: `to` is created empty.
/// * `to` missing: the directory is renamed (or copied then removed when a
///   rename is impossible, e.g. across filesystems).
/// * both present: entries are merged into `to`; any file that exists on both
///   sides aborts the migration with [`io::ErrorKind::AlreadyExists`] before
///   anything is moved.
///
/// On success `from` no longer exists. This is blocking; call it through
/// `tokio::task::spawn_blocking` from async code.
pub fn migrate_dir(from: &Path, to: &Path) -> io::Result<()> {
    if from == to {
        return fs::create_dir_all(to);
    }
    if !from.exists() {
        return fs::create_dir_all(to);
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    if !to.exists() {
        if fs::rename(from, to).is_ok() {
            return Ok(());
        }
        copy_tree(from, to)?;
        return fs::remove_dir_all(from);
    }

    if let Some(conflict) = first_conflict(from, to)? {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", conflict.display()),
        ));
    }
    merge_tree(from, to)?;
    fs::remove_dir_all(from)
}

fn first_conflict(from: &Path, to: &Path) -> io::Result<Option<PathBuf>> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if !target.exists() {
            continue;
        }
        if entry.file_type()?.is_dir() && target.is_dir() {
            if let Some(conflict) = first_conflict(&entry.path(), &target)? {
                return Ok(Some(conflict));
            }
        } else {
            return Ok(Some(target));
        }
    }
    Ok(None)
}

fn merge_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if target.is_dir() && entry.file_type()?.is_dir() {
            merge_tree(&entry.path(), &target)?;
        } else if fs::rename(entry.path(), &target).is_err() {
            if entry.file_type()?.is_dir() {
                copy_tree(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
