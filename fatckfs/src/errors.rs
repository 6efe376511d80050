// SPDX-License-Identifier: BSD-2-Clause

use core::fmt;

pub use fatckio::errors::*;

/// Errors that abort processing of the current table.
///
/// Everything here is fatal in the sense of the outcome taxonomy: chain
/// corruption, signature mismatches and hint inconsistencies are *not*
/// errors, they are findings reported through [`crate::report::CheckReport`]
/// and reflected in [`crate::report::Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    IO(BlockIOError),
    /// Bitmap or table buffer allocation failed.
    Alloc(&'static str),
    /// Accessor called with a cluster outside `[CLUST_FIRST, num_clusters)`.
    /// Always a programming or geometry error, never operator-fixable.
    InvalidCluster(u32),
    /// Write attempted on a table opened read-only.
    ReadOnly,
    Invalid(&'static str),
    Other(&'static str),
}

impl CheckError {
    pub fn msg(&self) -> &'static str {
        match self {
            CheckError::IO(_) => "IO error",
            CheckError::Alloc(what) => what,
            CheckError::InvalidCluster(_) => "Invalid cluster",
            CheckError::ReadOnly => "Table is read-only",
            CheckError::Invalid(msg) => msg,
            CheckError::Other(msg) => msg,
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        match self {
            CheckError::InvalidCluster(cl) => write!(f, " (cluster: {cl})"),
            CheckError::IO(e) => write!(f, "\n  caused by: {e}"),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for CheckError {}

impl From<BlockIOError> for CheckError {
    #[inline]
    fn from(e: BlockIOError) -> Self {
        CheckError::IO(e)
    }
}

impl From<&'static str> for CheckError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        CheckError::Other(msg)
    }
}

pub type CheckResult<T = ()> = Result<T, CheckError>;
