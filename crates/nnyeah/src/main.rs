use std::ffi::OsString;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::debug;

use nnyeah_core::{convert, init_tracing, ConversionConfig, ConversionError, Reporter};

fn cli() -> Command {
    Command::new("nnyeah")
        .version(nnyeah_core::VERSION)
        .about("Rewrites legacy nint/nuint call sites in a compiled module for the successor runtime")
        .disable_help_flag(true)
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .short_alias('?')
                .help("Print help")
                .action(ArgAction::Help),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("PATH")
                .help("Module to convert"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .help("Where to write the converted module"),
        )
        .arg(
            Arg::new("xamarin-assembly")
                .short('x')
                .long("xamarin-assembly")
                .value_name("PATH")
                .help("Module defining the legacy nint/nuint types"),
        )
        .arg(
            Arg::new("microsoft-assembly")
                .short('m')
                .long("microsoft-assembly")
                .value_name("PATH")
                .help("Module defining the successor runtime types"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log each rewrite and catalogue coverage")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("force-overwrite")
                .short('f')
                .long("force-overwrite")
                .help("Replace the output file if it exists")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("suppress-warnings")
                .short('s')
                .long("suppress-warnings")
                .help("Do not print warning diagnostics")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Treat legacy members without a transformation as errors")
                .action(ArgAction::SetTrue),
        )
}

fn config_from(matches: &ArgMatches) -> ConversionConfig {
    let path = |name: &str| matches.get_one::<String>(name).map(PathBuf::from);
    ConversionConfig {
        input: path("input"),
        output: path("output"),
        legacy_module: path("xamarin-assembly"),
        successor_module: path("microsoft-assembly"),
        verbose: matches.get_flag("verbose"),
        force_overwrite: matches.get_flag("force-overwrite"),
        suppress_warnings: matches.get_flag("suppress-warnings"),
        strict: matches.get_flag("strict"),
    }
}

/// Parse arguments into a configuration. Help and version requests end the
/// process successfully; any other command-line error exits with status 1.
fn parse_config<I, T>(args: I) -> std::result::Result<ConversionConfig, ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match cli().try_get_matches_from(args) {
        Ok(matches) => Ok(config_from(&matches)),
        Err(err) => {
            let _ = err.print();
            match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Err(ExitCode::SUCCESS),
                _ => Err(ExitCode::FAILURE),
            }
        }
    }
}

fn run(config: &ConversionConfig) -> Result<u8> {
    let report = convert(config)?;
    let reporter = Reporter::new(config.suppress_warnings);
    reporter.emit(&report, &mut io::stderr().lock())?;
    Ok(reporter.exit_code(&report) as u8)
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<ConversionError>() {
        Some(conversion) if !conversion.is_internal() => eprintln!("nnyeah: {conversion}"),
        _ => {
            eprintln!("nnyeah: internal error, please report this as a bug");
            eprintln!("{err:?}");
        }
    }
}

fn main() -> ExitCode {
    let config = match parse_config(std::env::args_os()) {
        Ok(config) => config,
        Err(code) => return code,
    };
    init_tracing(config.verbose);
    debug!(?config, "Parsed arguments");

    match panic::catch_unwind(AssertUnwindSafe(|| run(&config))) {
        Ok(Ok(code)) => ExitCode::from(code),
        Ok(Err(err)) => {
            report_error(&err);
            ExitCode::FAILURE
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            eprintln!("nnyeah: internal error, please report this as a bug");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
