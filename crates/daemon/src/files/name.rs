//! Validated file names.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::storage::RESERVED_PREFIX;

/// Longest accepted name, in bytes. Matches common filesystem limits.
pub const MAX_NAME_LEN: usize = 255;

/// Reasons a client-supplied name is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// Empty name.
    #[error("file name is empty")]
    Empty,

    /// Name longer than [`MAX_NAME_LEN`].
    #[error("file name is {0} bytes, limit is {limit}", limit = MAX_NAME_LEN)]
    TooLong(usize),

    /// Name does not resolve to a direct child of the location.
    #[error("file name escapes its location: {0:?}")]
    Escapes(String),

    /// Name uses the prefix reserved for in-flight uploads.
    #[error("file name uses reserved prefix: {0:?}")]
    Reserved(String),
}

/// A name proven to address a direct child of one location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileName(String);

impl FileName {
    /// Validate `raw` as a file inside `location`.
    pub fn parse<P: AsRef<Path>>(location: P, raw: &str) -> Result<Self, NameError> {
        let location = location.as_ref();

        if raw.is_empty() {
            return Err(NameError::Empty);
        }
        if raw.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong(raw.len()));
        }
        // Backslash is a separator on some platforms; NUL truncates paths in
        // C APIs. Neither can appear in a portable single component.
        if raw.contains('\\') || raw.contains('\0') {
            return Err(NameError::Escapes(raw.to_string()));
        }

        let resolved = resolve(&location.join(raw));
        let direct_child = resolved.parent() == Some(location)
            && resolved.file_name() == Some(OsStr::new(raw));
        if !direct_child {
            return Err(NameError::Escapes(raw.to_string()));
        }

        if raw.starts_with(RESERVED_PREFIX) {
            return Err(NameError::Reserved(raw.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    /// The validated name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lexically resolve `.` and `..` components without consulting the
/// filesystem.
fn resolve(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}
