use std::path::Path;

use tracing::{debug, info};

use crate::config::ConversionConfig;
use crate::context::ModuleContext;
use crate::error::{ConversionError, Result};
use crate::module::Module;
use crate::report::RewriteReport;
use crate::rewriter::Rewriter;
use crate::transforms::{get_transforms, native_integer_attribute};

fn open(path: &Path) -> Result<Module> {
    debug!(path = %path.display(), "Opening module");
    Module::read(path).map_err(|source| ConversionError::ModuleOpen {
        path: path.to_path_buf(),
        source,
    })
}

/// Run one conversion: open the three modules, rewrite the input against
/// the catalogue, and write the result. The output is written even when
/// the report carries error diagnostics.
pub fn convert(config: &ConversionConfig) -> Result<RewriteReport> {
    let paths = config.validate()?;

    let legacy = open(paths.legacy_module)?;
    let successor = open(paths.successor_module)?;
    let edit = open(paths.input)?;
    info!(
        input = %paths.input.display(),
        legacy = %legacy.name,
        successor = %successor.name,
        "Converting module"
    );

    let mut ctx = ModuleContext::new(legacy, edit).with_successor(successor);
    let attributes = native_integer_attribute(ctx.types());
    let catalogue = get_transforms(&ctx, &attributes)?;

    if config.verbose {
        for signature in catalogue.coverage(ctx.legacy()) {
            info!(signature = %signature, "Legacy member has no transformation");
        }
        if let Some(successor) = ctx.successor() {
            catalogue.warn_unresolved(successor);
        }
    }

    let report = Rewriter::new(catalogue)
        .options(config.rewrite_options())
        .apply(&mut ctx);

    ctx.module()
        .write(paths.output)
        .map_err(|source| ConversionError::ModuleWrite {
            path: paths.output.to_path_buf(),
            source,
        })?;
    info!(output = %paths.output.display(), success = report.success(), "Wrote module");

    Ok(report)
}
