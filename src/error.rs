//! Error types for talkbook operations.

use thiserror::Error;

/// Errors that can occur while loading or navigating a talking book.
#[derive(Error, Debug)]
pub enum Error {
    /// A seek target (element id, timing reference, heading, page) has no match.
    #[error("Element not found: {0}")]
    NotFound(String),

    /// Book data contradicts the structure the navigator relies on.
    #[error("Structural invariant violated: {0}")]
    StructuralInvariant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid book: {0}")]
    InvalidBook(String),

    #[error("Invalid timing value: {0}")]
    InvalidTiming(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
