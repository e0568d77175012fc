//! # Nnyeah Core
//!
//! Migrates compiled modules off the legacy `System.nint`/`System.nuint`
//! types by rewriting their call sites in place:
//! - Module model with reference tables, splicing and verification
//! - Typed member signatures
//! - Transformation catalogue (signature to action)
//! - Rewrite engine and diagnostics
//!
//! The `nnyeah` binary is a thin command-line front end over [`convert`].

#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod converter;
pub mod error;
pub mod module;
pub mod report;
pub mod rewriter;
pub mod signature;
pub mod transforms;

pub use config::ConversionConfig;
pub use context::{LegacyFamily, ModuleContext, TypeSystem};
pub use converter::convert;
pub use error::{CatalogueError, ConversionError};
pub use module::{Module, ModuleError};
pub use report::{Diagnostic, DiagnosticCode, Reporter, RewriteReport, Severity};
pub use rewriter::{apply, RewriteOptions, Rewriter};
pub use signature::MemberSignature;
pub use transforms::{get_transforms, native_integer_attribute, Action, Catalogue};

/// Tool version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing; `RUST_LOG` overrides the default level
pub fn init_tracing(verbose: bool) {
    let directive = if verbose { "nnyeah_core=debug" } else { "nnyeah_core=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
