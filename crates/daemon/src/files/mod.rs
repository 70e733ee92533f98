//! Identity-scoped file operations.
//!
//! Every operation takes an authenticated [`crate::identity::Identity`] and
//! a client-supplied name. Names are validated into a [`FileName`] before
//! any storage access, so the backend only ever sees plain direct-child
//! names inside the caller's own location.
//!
//! # Security
//!
//! Validation is lexical: the name is joined onto the location, resolved
//! without touching the filesystem, and accepted only if the result is a
//! direct child of the location whose final component is the name itself.
//! Separators, `.` and `..` components, absolute paths and NUL bytes all
//! fail that check.

pub mod name;
pub mod store;

pub use name::{FileName, NameError, MAX_NAME_LEN};
pub use store::{PutReceipt, ScopedFileStore, StoreError};
