use std::path::{Path, PathBuf};

use crate::error::ConversionError;
use crate::report::{DiagnosticCode, Severity};
use crate::rewriter::RewriteOptions;

/// Settings for one conversion run
#[derive(Debug, Clone, Default)]
pub struct ConversionConfig {
    /// Module to rewrite
    pub input: Option<PathBuf>,
    /// Where the rewritten module is written
    pub output: Option<PathBuf>,
    /// Module defining the legacy `nint`/`nuint` types
    pub legacy_module: Option<PathBuf>,
    /// Module defining the successor runtime types
    pub successor_module: Option<PathBuf>,
    pub verbose: bool,
    pub force_overwrite: bool,
    pub suppress_warnings: bool,
    /// Report unknown legacy members as errors instead of warnings
    pub strict: bool,
}

/// Paths of a validated configuration
#[derive(Debug, Clone, Copy)]
pub struct ConversionPaths<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub legacy_module: &'a Path,
    pub successor_module: &'a Path,
}

impl ConversionConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: Some(input.into()),
            output: Some(output.into()),
            ..Self::default()
        }
    }

    pub fn with_modules(mut self, legacy: impl Into<PathBuf>, successor: impl Into<PathBuf>) -> Self {
        self.legacy_module = Some(legacy.into());
        self.successor_module = Some(successor.into());
        self
    }

    /// Check required paths before anything is opened: input and output
    /// first, then the defining modules, then output overwrite.
    pub fn validate(&self) -> Result<ConversionPaths<'_>, ConversionError> {
        let input = self.input.as_deref().ok_or(ConversionError::MissingPath("input"))?;
        let output = self.output.as_deref().ok_or(ConversionError::MissingPath("output"))?;
        let legacy_module = self
            .legacy_module
            .as_deref()
            .ok_or(ConversionError::MissingModule("legacy-defining"))?;
        let successor_module = self
            .successor_module
            .as_deref()
            .ok_or(ConversionError::MissingModule("successor-defining"))?;

        if output.exists() && !self.force_overwrite {
            return Err(ConversionError::OutputExists(output.to_path_buf()));
        }

        Ok(ConversionPaths {
            input,
            output,
            legacy_module,
            successor_module,
        })
    }

    pub fn rewrite_options(&self) -> RewriteOptions {
        let options = RewriteOptions::new();
        if self.strict {
            options.with_severity(DiagnosticCode::UnknownLegacyMember, Severity::Error)
        } else {
            options
        }
    }
}
