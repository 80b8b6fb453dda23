//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`Error`] directly; unlike
//! the teacher's `BlockDeviceError`, which wraps narrower `FatError`/
//! `DirError`/`FileError` enums and converts between them at module
//! boundaries, this crate's component modules share one flat enum covering
//! every kind in the taxonomy, since no component needs to match on an error
//! shape its sibling modules don't also produce.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    BadParam,
    InvalidCluster,
    Corrupt,
    Device,
    NoMemory,
    NoSpace,
    NotFound,
    AlreadyExists,
    IsDirectory,
    NotADirectory,
    ReadOnly,
    NotEmpty,
    Eof,
    UnsupportedFatType,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::BadParam => "invalid argument",
            Error::InvalidCluster => "cluster number out of range",
            Error::Corrupt => "corrupt on-disk structure",
            Error::Device => "block device error",
            Error::NoMemory => "allocation failed",
            Error::NoSpace => "no free cluster or directory slot",
            Error::NotFound => "path or entry not found",
            Error::AlreadyExists => "target already exists",
            Error::IsDirectory => "expected a file, found a directory",
            Error::NotADirectory => "expected a directory, found a file",
            Error::ReadOnly => "entry is read-only",
            Error::NotEmpty => "directory is not empty",
            Error::Eof => "chain walk past end",
            Error::UnsupportedFatType => "operation not meaningful for this FAT type",
        };
        f.write_str(s)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
