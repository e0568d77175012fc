/*!
Shared fixtures: a legacy-defining module, a successor runtime module, and
builders for synthetic methods that call a single member.
*/

#![allow(dead_code)]

use std::collections::HashMap;

use nnyeah_core::module::verify::member_effect;
use nnyeah_core::module::{
    Instruction, MemberRef, MethodBody, MethodDef, Module, OpCode, Operand, ParamSig, TypeDef, TypeRef, TypeSig,
};
use nnyeah_core::signature::MemberSignature;
use nnyeah_core::transforms::{Emit, EmitOperand};
use nnyeah_core::{native_integer_attribute, Catalogue, ModuleContext};

pub const LEGACY: &str = "Xamarin.iOS";
pub const SUCCESSOR: &str = "System.Runtime";
pub const CORE: &str = "mscorlib";

/// Type for a full name, scoped to the legacy module for legacy types
pub fn type_named(full_name: &str) -> TypeSig {
    if let Some(element) = full_name.strip_suffix("[]") {
        return type_named(element).array_of();
    }
    let (namespace, name) = full_name.rsplit_once('.').unwrap_or(("", full_name));
    let scope = match full_name {
        "System.nint" | "System.nuint" | "System.nfloat" => LEGACY,
        _ => CORE,
    };
    TypeSig::named(scope, namespace, name)
}

fn successor_type(namespace: &str, name: &str) -> TypeSig {
    TypeSig::named(SUCCESSOR, namespace, name)
}

/// Whether a legacy member is static
pub fn is_static(name: &str) -> bool {
    name.starts_with("op_") || matches!(name, "Parse" | "TryParse" | "CopyArray" | ".cctor")
}

/// Reference to the legacy member a signature names
pub fn legacy_member(signature: &MemberSignature) -> MemberRef {
    let (namespace, name) = signature.owner.rsplit_once('.').unwrap();
    let declaring_type = TypeRef::new(LEGACY, namespace, name);
    let return_type = type_named(&signature.return_type);
    let mut member = if is_static(&signature.name) {
        MemberRef::new(declaring_type, signature.name.clone(), return_type)
    } else {
        MemberRef::instance(declaring_type, signature.name.clone(), return_type)
    };
    for param in &signature.parameters {
        let ty = type_named(&param.type_name);
        member = member.param(ParamSig::new(if param.by_ref { ty.by_ref() } else { ty }));
    }
    member
}

pub fn legacy_member_text(signature: &str) -> MemberRef {
    legacy_member(&signature.parse().expect("valid signature"))
}

fn method_def(signature: &MemberSignature) -> MethodDef {
    let param_type = |p: &nnyeah_core::signature::SignatureParam| {
        let ty = type_named(&p.type_name);
        if p.by_ref {
            ty.by_ref()
        } else {
            ty
        }
    };
    MethodDef {
        name: signature.name.clone(),
        is_static: is_static(&signature.name),
        return_type: type_named(&signature.return_type),
        parameters: signature.parameters.iter().map(param_type).collect(),
        body: None,
    }
}

/// Legacy-defining module declaring one method per signature
pub fn legacy_module<'a>(signatures: impl IntoIterator<Item = &'a MemberSignature>) -> Module {
    let mut module = Module::new(LEGACY, CORE);
    for signature in signatures {
        let (namespace, name) = signature.owner.rsplit_once('.').unwrap();
        let index = match module.types.iter().position(|t| t.full_name() == signature.owner) {
            Some(index) => index,
            None => {
                module.types.push(TypeDef {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    methods: Vec::new(),
                });
                module.types.len() - 1
            }
        };
        module.types[index].methods.push(method_def(signature));
    }
    module
}

/// Successor runtime module defining a handful of `IntPtr` members
pub fn successor_module() -> Module {
    let mut module = Module::new(SUCCESSOR, SUCCESSOR);
    let int_ptr = successor_type("System", "IntPtr");
    let method = |name: &str, return_type: TypeSig, parameters: Vec<TypeSig>| MethodDef {
        name: name.to_string(),
        is_static: false,
        return_type,
        parameters,
        body: None,
    };
    module.types.push(TypeDef {
        namespace: "System".to_string(),
        name: "IntPtr".to_string(),
        methods: vec![
            method("GetHashCode", successor_type("System", "Int32"), vec![]),
            method("CompareTo", successor_type("System", "Int32"), vec![int_ptr.clone()]),
            method("ToString", successor_type("System", "String"), vec![]),
        ],
    });
    module
}

/// Empty module to edit, referencing the core library
pub fn app_module() -> Module {
    Module::new("App", CORE)
}

pub fn context(edit: Module) -> ModuleContext {
    ModuleContext::new(Module::new(LEGACY, CORE), edit).with_successor(successor_module())
}

pub fn build_catalogue(ctx: &ModuleContext) -> Catalogue {
    let attributes = native_integer_attribute(ctx.types());
    Catalogue::build(ctx, &attributes).expect("catalogue builds")
}

/// Opcode a compiler would use to invoke `member`
pub fn invocation_opcode(member: &MemberRef) -> OpCode {
    if member.is_constructor() {
        OpCode::Newobj
    } else {
        OpCode::Call
    }
}

/// A synthetic method: load enough arguments, invoke `member`, discard the
/// result and return
pub struct Synthetic {
    pub prologue: Vec<Instruction>,
    pub call: Instruction,
    pub epilogue: Vec<Instruction>,
}

impl Synthetic {
    pub fn instructions(&self) -> Vec<Instruction> {
        let mut all = self.prologue.clone();
        all.push(self.call.clone());
        all.extend(self.epilogue.iter().cloned());
        all
    }
}

/// Append a static method calling `member` to `App.Calls`; returns the
/// method's position within that type
pub fn add_call_method(module: &mut Module, method_name: &str, member: &MemberRef, opcode: OpCode) -> Synthetic {
    let token = module.import_member(member);
    let effect = member_effect(opcode, member);

    let prologue: Vec<Instruction> = (0..effect.pops)
        .map(|i| Instruction::with(OpCode::Ldarg, Operand::Argument(i as u16)))
        .collect();
    let call = Instruction::with(opcode, Operand::Member(token));
    let mut epilogue = Vec::new();
    if effect.pushes > 0 {
        epilogue.push(Instruction::new(OpCode::Pop));
    }
    epilogue.push(Instruction::new(OpCode::Ret));

    let synthetic = Synthetic { prologue, call, epilogue };
    let method = MethodDef {
        name: method_name.to_string(),
        is_static: true,
        return_type: TypeSig::named(CORE, "System", "Void"),
        parameters: vec![TypeSig::named(CORE, "System", "Object"); effect.pops],
        body: Some(MethodBody::new(synthetic.instructions())),
    };

    match module.types.iter_mut().find(|t| t.full_name() == "App.Calls") {
        Some(calls) => calls.methods.push(method),
        None => module.types.push(TypeDef {
            namespace: "App".to_string(),
            name: "Calls".to_string(),
            methods: vec![method],
        }),
    }
    synthetic
}

/// Instructions a replacement sequence is expected to lower to in `module`.
/// Temporaries take fresh local slots in order of first use.
pub fn expected_lowering(module: &Module, sequence: &[Emit]) -> Vec<Instruction> {
    let mut temps: HashMap<TypeSig, u16> = HashMap::new();
    sequence
        .iter()
        .map(|emit| {
            let operand = match &emit.operand {
                EmitOperand::None => Operand::None,
                EmitOperand::Int32(value) => Operand::Int32(*value),
                EmitOperand::Type(ty) => Operand::Type(module.type_token(ty).expect("type imported")),
                EmitOperand::Member(member) => Operand::Member(module.member_token(member).expect("member imported")),
                EmitOperand::Temp(ty) => {
                    let next = temps.len() as u16;
                    Operand::Local(*temps.entry(ty.clone()).or_insert(next))
                }
            };
            Instruction::with(emit.opcode, operand)
        })
        .collect()
}

/// Body of `App.Calls::<name>`
pub fn body_of<'m>(module: &'m Module, name: &str) -> &'m MethodBody {
    module
        .find_type("App.Calls")
        .and_then(|t| t.methods.iter().find(|m| m.name == name))
        .and_then(|m| m.body.as_ref())
        .unwrap_or_else(|| panic!("no method {name}"))
}
