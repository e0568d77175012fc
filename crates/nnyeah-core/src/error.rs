use std::path::PathBuf;

use crate::module::ModuleError;
use crate::signature::SignatureParseError;

/// Failures while building the transformation catalogue. These indicate a
/// defect in the catalogue itself, never in the input module.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogueError {
    #[error("duplicate transformation for `{0}`")]
    DuplicateSignature(String),

    #[error(transparent)]
    MalformedSignature(#[from] SignatureParseError),
}

/// Errors that end a conversion run
#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    #[error("missing required {0} path")]
    MissingPath(&'static str),

    #[error("missing {0} module path")]
    MissingModule(&'static str),

    #[error("output file {0} already exists (use --force-overwrite to replace it)")]
    OutputExists(PathBuf),

    #[error("unable to open module {path}: {source}")]
    ModuleOpen {
        path: PathBuf,
        #[source]
        source: ModuleError,
    },

    #[error("unable to write module {path}: {source}")]
    ModuleWrite {
        path: PathBuf,
        #[source]
        source: ModuleError,
    },

    #[error("transformation catalogue could not be built: {0}")]
    Catalogue(#[from] CatalogueError),
}

impl ConversionError {
    /// Whether this is a defect in the tool rather than a user mistake
    pub fn is_internal(&self) -> bool {
        matches!(self, ConversionError::Catalogue(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ConversionError::MissingPath(_) | ConversionError::MissingModule(_) | ConversionError::OutputExists(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConversionError>;
