//! Caller-visible failure taxonomy.
//!
//! Every failure of [`crate::AdEngine`] falls into exactly one [`ErrorKind`]:
//!
//! | Kind | Variants | Meaning |
//! |------|----------|---------|
//! | `NotFound` | [`Error::NotFound`] | nothing to show or act on |
//! | `Conflict` | [`Error::NoImpression`], [`Error::AlreadyClicked`] | click-after-impression invariant violated |
//! | `Internal` | [`Error::Internal`] | collaborator I/O failure or deadline exceeded |
//!
//! Infrastructure code returns `anyhow::Result`; `?` lifts those errors into
//! `Internal` through the `From` impl.

use std::fmt;

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Client,
    Campaign,
    /// No eligible campaign passed scoring and rotation.
    Ad,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Client => write!(f, "client"),
            Missing::Campaign => write!(f, "campaign"),
            Missing::Ad => write!(f, "ad"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("cannot record click: ad was not shown to this client")]
    NoImpression,
    #[error("click already recorded for this ad and client")]
    AlreadyClicked,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NoImpression | Error::AlreadyClicked => ErrorKind::Conflict,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
