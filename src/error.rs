//! Error Types

use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum MkgigError {
    #[error("{message}")]
    Usage { message: String },

    #[error("could not open file '{path}': {reason}")]
    SourceOpen { path: String, reason: String },

    #[error("audio format not supported: {message}")]
    UnsupportedEncoding { message: String },

    #[error("gig write error: {message}")]
    ContainerWrite { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {message}")]
    Config { message: String },
}

impl MkgigError {
    pub fn usage<S: Into<String>>(msg: S) -> Self { Self::Usage { message: msg.into() } }
    pub fn unsupported<S: Into<String>>(msg: S) -> Self { Self::UnsupportedEncoding { message: msg.into() } }
    pub fn container<S: Into<String>>(msg: S) -> Self { Self::ContainerWrite { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { Self::Config { message: msg.into() } }

    pub fn source_open<P: Into<String>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::SourceOpen { path: path.into(), reason: reason.into() }
    }

    /// Mid-stream failure that is not an `std::io::Error` underneath.
    pub fn io<S: Into<String>>(msg: S) -> Self {
        Self::Io(std::io::Error::other(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, MkgigError>;
