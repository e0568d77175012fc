/*!
# Rewrite Engine

Walks every method body of the module under edit, matches invocation
instructions against the [`Catalogue`], and applies the matched action.

Within a body the scan is a single left-to-right pass; spliced instructions
are stepped over and never rescanned. A method whose rewritten body fails
verification is restored to its original body.
*/

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::context::{LegacyFamily, MethodHandle, ModuleContext};
use crate::module::verify::member_effect;
use crate::module::{verify_body, Instruction, MemberRef, MethodBody, OpCode, Operand, TypeSig};
use crate::report::{Diagnostic, DiagnosticCode, RewriteReport, Severity};
use crate::signature::MemberSignature;
use crate::transforms::{sequence_effect, Action, Catalogue, Emit, EmitOperand};

/// Caller-tunable engine behaviour
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    severities: HashMap<DiagnosticCode, Severity>,
}

impl RewriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the severity a diagnostic code is reported with
    pub fn with_severity(mut self, code: DiagnosticCode, severity: Severity) -> Self {
        self.severities.insert(code, severity);
        self
    }

    pub fn severity(&self, code: DiagnosticCode) -> Severity {
        self.severities
            .get(&code)
            .copied()
            .unwrap_or_else(|| code.default_severity())
    }
}

/// An invocation that targets a catalogued or legacy member
struct CallSite {
    opcode: OpCode,
    member: MemberRef,
    signature: MemberSignature,
}

/// Per-method rewriting state
struct MethodRewrite {
    name: String,
    body: MethodBody,
    temps: HashMap<TypeSig, u16>,
    report: RewriteReport,
    first_change: Option<usize>,
}

impl MethodRewrite {
    fn diagnose(&mut self, options: &RewriteOptions, code: DiagnosticCode, signature: &str, instruction: usize) {
        self.report.diagnostics.push(Diagnostic {
            code,
            severity: options.severity(code),
            signature: signature.to_string(),
            method: self.name.clone(),
            instruction,
        });
    }

    /// Lower one replacement instruction, importing references as needed
    fn lower(&mut self, ctx: &mut ModuleContext, emit: &Emit) -> Instruction {
        let operand = match &emit.operand {
            EmitOperand::None => Operand::None,
            EmitOperand::Int32(value) => Operand::Int32(*value),
            EmitOperand::Type(ty) => Operand::Type(ctx.import_type(ty)),
            EmitOperand::Member(member) => Operand::Member(ctx.import_member(member)),
            EmitOperand::Temp(ty) => {
                let body = &mut self.body;
                let slot = *self
                    .temps
                    .entry(ty.clone())
                    .or_insert_with(|| body.add_local(ty.clone()));
                Operand::Local(slot)
            }
        };
        Instruction::with(emit.opcode, operand)
    }
}

pub struct Rewriter<'c> {
    catalogue: &'c Catalogue,
    options: RewriteOptions,
}

impl<'c> Rewriter<'c> {
    pub fn new(catalogue: &'c Catalogue) -> Self {
        Self {
            catalogue,
            options: RewriteOptions::default(),
        }
    }

    pub fn options(mut self, options: RewriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Rewrite every method body in declaration order
    pub fn apply(&self, ctx: &mut ModuleContext) -> RewriteReport {
        let mut report = RewriteReport::new();
        for handle in ctx.methods() {
            report.merge(self.rewrite_method(ctx, handle));
        }

        info!(
            module = %ctx.module().name,
            methods = report.methods_scanned,
            changed = report.methods_changed,
            replaced = report.replaced,
            passed_through = report.passed_through,
            diagnostics = report.diagnostics.len(),
            "Rewrite complete"
        );
        report
    }

    fn call_site(&self, ctx: &ModuleContext, instruction: &Instruction) -> Option<CallSite> {
        if !instruction.opcode.is_invocation() {
            return None;
        }
        let member = ctx.module().member(instruction.member()?)?;
        if LegacyFamily::from_full_name(&member.declaring_type.full_name()).is_none() {
            return None;
        }
        Some(CallSite {
            opcode: instruction.opcode,
            member: member.clone(),
            signature: MemberSignature::of(member),
        })
    }

    fn rewrite_method(&self, ctx: &mut ModuleContext, handle: MethodHandle) -> RewriteReport {
        let Some(original) = ctx.take_body(handle) else {
            return RewriteReport::new();
        };
        let (type_def, method) = ctx.method(handle);
        let method_signature = MemberSignature::of_method(type_def, method).canonical();

        let mut state = MethodRewrite {
            name: format!("{}::{}", type_def.full_name(), method.name),
            body: original.clone(),
            temps: HashMap::new(),
            report: RewriteReport::new(),
            first_change: None,
        };
        state.report.methods_scanned = 1;

        let mut index = 0;
        let mut origin = 0;
        while index < state.body.instructions.len() {
            let Some(site) = self.call_site(ctx, &state.body.instructions[index]) else {
                index += 1;
                origin += 1;
                continue;
            };
            let signature = site.signature.canonical();

            match self.catalogue.get(&site.signature) {
                None => {
                    if ctx.is_legacy_type(&site.member.declaring_type) {
                        debug!(method = %state.name, signature = %signature, "No transformation for legacy member");
                        state.diagnose(&self.options, DiagnosticCode::UnknownLegacyMember, &signature, origin);
                        state.report.diagnosed += 1;
                        state.report.stats_mut(&signature).diagnosed += 1;
                    }
                    index += 1;
                }
                Some(Action::PassThrough) => {
                    state.report.passed_through += 1;
                    state.report.stats_mut(&signature).passed_through += 1;
                    index += 1;
                }
                Some(Action::Diagnostic(code)) => {
                    debug!(method = %state.name, signature = %signature, code = %code, "Unsupported legacy member");
                    state.diagnose(&self.options, *code, &signature, origin);
                    state.report.diagnosed += 1;
                    state.report.stats_mut(&signature).diagnosed += 1;
                    index += 1;
                }
                Some(Action::Replace(sequence)) => {
                    let sequence = self.replacement_for(ctx, &site, sequence);
                    if !Self::preserves_stack(&site, &sequence) {
                        warn!(method = %state.name, signature = %signature, "Replacement changes stack shape");
                        state.diagnose(&self.options, DiagnosticCode::StackMismatch, &signature, origin);
                        state.report.diagnosed += 1;
                        state.report.stats_mut(&signature).diagnosed += 1;
                        index += 1;
                    } else {
                        let instructions: Vec<Instruction> =
                            sequence.iter().map(|emit| state.lower(ctx, emit)).collect();
                        let inserted = instructions.len();
                        state.body.splice(index, instructions);
                        state.first_change.get_or_insert(origin);
                        state.report.replaced += 1;
                        state.report.stats_mut(&signature).replaced += 1;
                        debug!(method = %state.name, signature = %signature, inserted, "Replaced legacy call");
                        index += inserted;
                    }
                }
            }
            origin += 1;
        }

        let Some(first_change) = state.first_change else {
            ctx.restore_body(handle, original);
            return state.report;
        };

        let (_, method) = ctx.method(handle);
        match verify_body(ctx.module(), method, &state.body) {
            Ok(max_stack) => {
                state.body.max_stack = max_stack;
                state.report.methods_changed = 1;
                ctx.restore_body(handle, state.body);
            }
            Err(err) => {
                warn!(method = %state.name, error = %err, "Rewritten body failed verification; restoring original");
                ctx.restore_body(handle, original);
                state.report.replaced = 0;
                for stats in state.report.signatures.values_mut() {
                    stats.replaced = 0;
                }
                state.report.signatures.retain(|_, stats| stats.total() > 0);
                state.diagnose(&self.options, DiagnosticCode::InvalidMethodBody, &method_signature, first_change);
                state.report.diagnosed += 1;
                state.report.stats_mut(&method_signature).diagnosed += 1;
            }
        }
        state.report
    }

    /// Catalogue sequence adjusted for the call form. A constructor invoked
    /// on an address (`call instance void T::.ctor`) stores the converted
    /// value through that address.
    fn replacement_for(&self, ctx: &ModuleContext, site: &CallSite, sequence: &[Emit]) -> Vec<Emit> {
        let mut sequence = sequence.to_vec();
        if site.opcode != OpCode::Newobj && site.member.is_constructor() && site.member.has_this {
            if let Some(family) = LegacyFamily::of(&site.signature) {
                sequence.push(Emit::ty(OpCode::Stobj, family.successor(ctx.types())));
            }
        }
        sequence
    }

    /// The replacement may consume no more than the call did and must
    /// leave the same net depth
    fn preserves_stack(site: &CallSite, sequence: &[Emit]) -> bool {
        let legacy = member_effect(site.opcode, &site.member);
        match sequence_effect(sequence) {
            Some(effect) => effect.pops <= legacy.pops && effect.net() == legacy.net(),
            None => false,
        }
    }
}

/// Rewrite the module under edit with default options
pub fn apply(ctx: &mut ModuleContext, catalogue: &Catalogue) -> RewriteReport {
    Rewriter::new(catalogue).apply(ctx)
}
