//! Error types for document preparation

use thiserror::Error;

/// Main error type for the preparation pipeline
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Malformed mesh: {0}")]
    MalformedMesh(String),

    #[error("Part '{0}' required by the template is missing from the mesh")]
    MissingPart(String),

    #[error("Part '{0}' is not declared by the template")]
    TemplateMissingPart(String),

    #[error("Named selection '{0}' reconstructed empty")]
    SelectionLost(String),

    #[error("Malformed template: {0}")]
    MalformedTemplate(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Result type for preparation operations
pub type CoreResult<T> = Result<T, CoreError>;
