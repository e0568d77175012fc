/*!
# Transformation Catalogue

Maps the signature of every known legacy `nint`/`nuint` member to the
[`Action`] that migrates a call to it. The catalogue is pure data: it is built
once from the module context's type system and then only read.

Entries come from two sources:
- [`table`]: conversions, operators and comparisons that lower to plain
  opcode sequences, plus pass-through and diagnostic entries
- [`members`]: replacements that call into the successor runtime and so need
  type references and native-integer attributes
*/

use std::sync::OnceLock;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::context::{self, ModuleContext, TypeSystem};
use crate::error::CatalogueError;
use crate::module::verify::member_effect;
use crate::module::{AttributeArg, CustomAttribute, MemberRef, Module, OpCode, StackCount, StackEffect, TypeSig};
use crate::report::DiagnosticCode;
use crate::signature::MemberSignature;

pub mod members;
pub mod table;

/// Operand of an instruction to be emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOperand {
    None,
    Int32(i32),
    /// Imported into the edited module when spliced
    Type(TypeSig),
    /// Imported into the edited module when spliced
    Member(MemberRef),
    /// Temporary local of this type, allocated once per rewritten method
    Temp(TypeSig),
}

/// One instruction of a replacement sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emit {
    pub opcode: OpCode,
    pub operand: EmitOperand,
}

impl Emit {
    pub fn op(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: EmitOperand::None,
        }
    }

    pub fn int(opcode: OpCode, value: i32) -> Self {
        Self {
            opcode,
            operand: EmitOperand::Int32(value),
        }
    }

    pub fn ty(opcode: OpCode, ty: TypeSig) -> Self {
        Self {
            opcode,
            operand: EmitOperand::Type(ty),
        }
    }

    pub fn member(opcode: OpCode, member: MemberRef) -> Self {
        Self {
            opcode,
            operand: EmitOperand::Member(member),
        }
    }

    pub fn temp(opcode: OpCode, ty: TypeSig) -> Self {
        Self {
            opcode,
            operand: EmitOperand::Temp(ty),
        }
    }

    /// Stack effect, if it can be known without a method context
    pub fn effect(&self) -> Option<StackEffect> {
        let behaviour = self.opcode.stack_behaviour();
        match (behaviour.pops, behaviour.pushes, &self.operand) {
            (StackCount::Fixed(pops), StackCount::Fixed(pushes), _) => {
                Some(StackEffect::new(pops as usize, pushes as usize))
            }
            (_, _, EmitOperand::Member(member)) if self.opcode.is_invocation() => {
                Some(member_effect(self.opcode, member))
            }
            _ => None,
        }
    }
}

/// Combined stack effect of a replacement sequence
pub fn sequence_effect(sequence: &[Emit]) -> Option<StackEffect> {
    sequence
        .iter()
        .try_fold(StackEffect::default(), |acc, emit| Some(acc.then(emit.effect()?)))
}

/// What to do with a call to a catalogued member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Already valid on the successor runtime
    PassThrough,
    /// Replace the call with this sequence; empty removes the call
    Replace(Vec<Emit>),
    /// Leave the call and record a diagnostic
    Diagnostic(DiagnosticCode),
}

/// Produces the native-integer attribute for a list of slot flags
pub type AttributeFactory<'a> = &'a dyn Fn(&[bool]) -> CustomAttribute;

/// `NativeIntegerAttribute` factory scoped to the successor core library.
/// A single `true` flag yields the parameterless form.
pub fn native_integer_attribute(types: &TypeSystem) -> impl Fn(&[bool]) -> CustomAttribute {
    let attribute_type = types.core_type("System.Runtime.CompilerServices", "NativeIntegerAttribute");
    move |flags: &[bool]| CustomAttribute {
        attribute_type: attribute_type.clone(),
        arguments: if flags == [true] {
            Vec::new()
        } else {
            vec![AttributeArg::BoolArray(flags.to_vec())]
        },
    }
}

/// Accumulates catalogue entries, rejecting duplicates
#[derive(Debug, Default)]
pub struct CatalogueBuilder {
    entries: IndexMap<MemberSignature, Action>,
}

impl CatalogueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry under canonical signature text
    pub fn insert(&mut self, signature: &str, action: Action) -> Result<&mut Self, CatalogueError> {
        let signature: MemberSignature = signature.parse()?;
        self.insert_signature(signature, action)
    }

    pub fn insert_signature(
        &mut self,
        signature: MemberSignature,
        action: Action,
    ) -> Result<&mut Self, CatalogueError> {
        if self.entries.contains_key(&signature) {
            return Err(CatalogueError::DuplicateSignature(signature.canonical()));
        }
        self.entries.insert(signature, action);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Catalogue {
        Catalogue { entries: self.entries }
    }
}

/// Immutable signature to action mapping
#[derive(Debug, Clone)]
pub struct Catalogue {
    entries: IndexMap<MemberSignature, Action>,
}

impl Catalogue {
    /// Build the full catalogue for both legacy families
    pub fn build(ctx: &ModuleContext, attributes: AttributeFactory<'_>) -> Result<Self, CatalogueError> {
        let types = ctx.types();
        let mut builder = CatalogueBuilder::new();
        table::register(&mut builder)?;
        members::register(&mut builder, types, attributes)?;
        debug!(entries = builder.len(), core_library = types.core_library(), "Built transformation catalogue");
        Ok(builder.finish())
    }

    pub fn get(&self, signature: &MemberSignature) -> Option<&Action> {
        self.entries.get(signature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemberSignature, &Action)> {
        self.entries.iter()
    }

    /// Legacy-family methods of `legacy` with no entry
    pub fn coverage(&self, legacy: &Module) -> Vec<MemberSignature> {
        context::legacy_signatures(legacy)
            .into_iter()
            .filter(|signature| !self.entries.contains_key(signature))
            .collect()
    }

    /// Replacement members that `successor` does not define
    pub fn unresolved_in(&self, successor: &Module) -> Vec<&MemberRef> {
        let mut unresolved: Vec<&MemberRef> = Vec::new();
        for action in self.entries.values() {
            let Action::Replace(sequence) = action else {
                continue;
            };
            for emit in sequence {
                if let EmitOperand::Member(member) = &emit.operand {
                    if !context::module_defines(successor, member) && !unresolved.contains(&member) {
                        unresolved.push(member);
                    }
                }
            }
        }
        unresolved
    }

    /// Log replacement targets missing from the successor module
    pub fn warn_unresolved(&self, successor: &Module) {
        for member in self.unresolved_in(successor) {
            warn!(member = %member, module = %successor.name, "Replacement member not defined by successor module");
        }
    }
}

static TRANSFORMS: OnceLock<Result<Catalogue, CatalogueError>> = OnceLock::new();

/// Process-wide catalogue, built on first use. Later calls return the same
/// instance (or the same build error) regardless of their arguments.
pub fn get_transforms(
    ctx: &ModuleContext,
    attributes: AttributeFactory<'_>,
) -> Result<&'static Catalogue, CatalogueError> {
    TRANSFORMS
        .get_or_init(|| Catalogue::build(ctx, attributes))
        .as_ref()
        .map_err(Clone::clone)
}
