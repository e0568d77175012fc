/*!
# Diagnostics and Reporting

Coded diagnostics recorded while rewriting, the per-run [`RewriteReport`],
and the [`Reporter`] that prints diagnostics and decides the exit status.
*/

use std::fmt;
use std::io::{self, Write};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// Stable diagnostic codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Explicit narrowing through the legacy `IConvertible` implementation
    ConvertibleNarrowing,
    /// Legacy bulk array copy
    UnsupportedArrayCopy,
    UnknownLegacyMember,
    StackMismatch,
    /// Rewritten body failed verification and was restored
    InvalidMethodBody,
}

impl DiagnosticCode {
    pub const ALL: [DiagnosticCode; 5] = [
        DiagnosticCode::ConvertibleNarrowing,
        DiagnosticCode::UnsupportedArrayCopy,
        DiagnosticCode::UnknownLegacyMember,
        DiagnosticCode::StackMismatch,
        DiagnosticCode::InvalidMethodBody,
    ];

    pub fn code(self) -> &'static str {
        match self {
            DiagnosticCode::ConvertibleNarrowing => "NY0001",
            DiagnosticCode::UnsupportedArrayCopy => "NY0002",
            DiagnosticCode::UnknownLegacyMember => "NY0003",
            DiagnosticCode::StackMismatch => "NY0004",
            DiagnosticCode::InvalidMethodBody => "NY0005",
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticCode::UnknownLegacyMember => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DiagnosticCode::ConvertibleNarrowing => {
                "explicit conversion through IConvertible has no equivalent on the successor runtime"
            }
            DiagnosticCode::UnsupportedArrayCopy => {
                "bulk array copy between a pointer and a legacy native integer array is not supported"
            }
            DiagnosticCode::UnknownLegacyMember => "legacy native integer member has no known transformation",
            DiagnosticCode::StackMismatch => "replacement would change the evaluation stack shape; call left unchanged",
            DiagnosticCode::InvalidMethodBody => "rewritten method failed verification; original body restored",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One diagnostic tied to a call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    /// Canonical signature of the called member
    pub signature: String,
    /// `Type::Method` containing the call
    pub method: String,
    /// Index of the call instruction in the original body
    pub instruction: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} [{}] in {} at instruction {}",
            self.severity,
            self.code,
            self.code.message(),
            self.signature,
            self.method,
            self.instruction
        )
    }
}

/// Per-signature application counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStats {
    pub replaced: u64,
    pub passed_through: u64,
    pub diagnosed: u64,
}

impl SignatureStats {
    pub fn total(&self) -> u64 {
        self.replaced + self.passed_through + self.diagnosed
    }
}

/// Outcome of rewriting a module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteReport {
    pub methods_scanned: u64,
    pub methods_changed: u64,
    pub replaced: u64,
    pub passed_through: u64,
    pub diagnosed: u64,
    pub signatures: IndexMap<String, SignatureStats>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RewriteReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: RewriteReport) {
        self.methods_scanned += other.methods_scanned;
        self.methods_changed += other.methods_changed;
        self.replaced += other.replaced;
        self.passed_through += other.passed_through;
        self.diagnosed += other.diagnosed;
        for (signature, stats) in other.signatures {
            let entry = self.signatures.entry(signature).or_default();
            entry.replaced += stats.replaced;
            entry.passed_through += stats.passed_through;
            entry.diagnosed += stats.diagnosed;
        }
        self.diagnostics.extend(other.diagnostics);
    }

    pub(crate) fn stats_mut(&mut self, signature: &str) -> &mut SignatureStats {
        self.signatures.entry(signature.to_string()).or_default()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn success(&self) -> bool {
        !self.has_errors()
    }

    /// Diagnostics carrying `code`
    pub fn with_code(&self, code: DiagnosticCode) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.code == code).collect()
    }
}

/// Prints diagnostics and maps a report to a process exit status
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    suppress_warnings: bool,
}

impl Reporter {
    pub fn new(suppress_warnings: bool) -> Self {
        Self { suppress_warnings }
    }

    /// Write errors, then warnings unless suppressed
    pub fn emit<W: Write>(&self, report: &RewriteReport, out: &mut W) -> io::Result<()> {
        for diagnostic in report.errors() {
            writeln!(out, "{diagnostic}")?;
        }
        if !self.suppress_warnings {
            for diagnostic in report.warnings() {
                writeln!(out, "{diagnostic}")?;
            }
        }
        Ok(())
    }

    pub fn exit_code(&self, report: &RewriteReport) -> i32 {
        if report.has_errors() {
            1
        } else {
            0
        }
    }
}
