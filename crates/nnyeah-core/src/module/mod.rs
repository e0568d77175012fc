/*!
# Module Model

In-memory image of a compiled module: reference tables, type and method
definitions, and method bodies as instruction lists. Modules are persisted as
JSON images.

Instructions never embed references directly. Type and member operands are
tokens into the module's own reference tables, so anything spliced into a
body from elsewhere must first be imported with [`Module::import_type`] or
[`Module::import_member`].
*/

use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

pub mod body;
pub mod opcode;
pub mod verify;

pub use body::{ExceptionHandler, HandlerKind, MethodBody};
pub use opcode::{FlowControl, OpCode, OperandKind, StackBehaviour, StackCount};
pub use verify::{verify_body, verify_module, StackEffect, VerifyError};

/// Module read/write errors
#[derive(thiserror::Error, Debug)]
pub enum ModuleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed module image: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Module {module} failed verification: {source}")]
    Invalid {
        module: String,
        #[source]
        source: VerifyError,
    },
}

/// Reference to a named type in some scope (assembly)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub scope: String,
    pub namespace: String,
    pub name: String,
}

impl TypeRef {
    pub fn new(scope: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Type as it appears in a signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSig {
    Named(TypeRef),
    Array(Box<TypeSig>),
    ByRef(Box<TypeSig>),
}

impl TypeSig {
    pub fn named(scope: &str, namespace: &str, name: &str) -> Self {
        TypeSig::Named(TypeRef::new(scope, namespace, name))
    }

    pub fn array_of(self) -> Self {
        TypeSig::Array(Box::new(self))
    }

    pub fn by_ref(self) -> Self {
        TypeSig::ByRef(Box::new(self))
    }

    pub fn full_name(&self) -> String {
        match self {
            TypeSig::Named(t) => t.full_name(),
            TypeSig::Array(elem) => format!("{}[]", elem.full_name()),
            TypeSig::ByRef(elem) => format!("{}&", elem.full_name()),
        }
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeSig::ByRef(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Named(t) if t.namespace == "System" && t.name == "Void")
    }

    /// Innermost named type, looking through arrays and by-refs
    pub fn element(&self) -> &TypeRef {
        match self {
            TypeSig::Named(t) => t,
            TypeSig::Array(elem) | TypeSig::ByRef(elem) => elem.element(),
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.element().scope, self.full_name())
    }
}

/// Constructor argument of a custom attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeArg {
    Bool(bool),
    BoolArray(Vec<bool>),
    Int32(i32),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomAttribute {
    pub attribute_type: TypeRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<AttributeArg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamSig {
    #[serde(rename = "type")]
    pub ty: TypeSig,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_out: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<CustomAttribute>,
}

impl ParamSig {
    pub fn new(ty: TypeSig) -> Self {
        Self {
            ty,
            is_out: false,
            attributes: Vec::new(),
        }
    }

    pub fn out(mut self) -> Self {
        self.is_out = true;
        self
    }

    pub fn with_attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// Reference to a method, possibly in another module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    pub declaring_type: TypeRef,
    pub name: String,
    #[serde(default)]
    pub has_this: bool,
    pub return_type: ParamSig,
    #[serde(default)]
    pub parameters: Vec<ParamSig>,
}

impl MemberRef {
    /// Static member reference
    pub fn new(declaring_type: TypeRef, name: impl Into<String>, return_type: TypeSig) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            has_this: false,
            return_type: ParamSig::new(return_type),
            parameters: Vec::new(),
        }
    }

    /// Instance member reference
    pub fn instance(declaring_type: TypeRef, name: impl Into<String>, return_type: TypeSig) -> Self {
        Self {
            has_this: true,
            ..Self::new(declaring_type, name, return_type)
        }
    }

    pub fn param(mut self, param: ParamSig) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn param_type(self, ty: TypeSig) -> Self {
        self.param(ParamSig::new(ty))
    }

    pub fn return_attribute(mut self, attribute: CustomAttribute) -> Self {
        self.return_type.attributes.push(attribute);
        self
    }

    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.parameters.iter().map(|p| p.ty.full_name()).collect();
        write!(
            f,
            "{}{} [{}]{}::{}({})",
            if self.has_this { "instance " } else { "" },
            self.return_type.ty.full_name(),
            self.declaring_type.scope,
            self.declaring_type.full_name(),
            self.name,
            params.join(",")
        )
    }
}

/// Index into a module's type reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeToken(pub u32);

/// Index into a module's member reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberToken(pub u32);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    #[default]
    None,
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Local(u16),
    Argument(u16),
    /// Branch target as an instruction index
    Target(usize),
    Switch(Vec<usize>),
    Type(TypeToken),
    Member(MemberToken),
}

impl Operand {
    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Int32(_) => OperandKind::Int32,
            Operand::Int64(_) => OperandKind::Int64,
            Operand::Float64(_) => OperandKind::Float64,
            Operand::String(_) => OperandKind::String,
            Operand::Local(_) => OperandKind::Local,
            Operand::Argument(_) => OperandKind::Argument,
            Operand::Target(_) => OperandKind::Target,
            Operand::Switch(_) => OperandKind::Switch,
            Operand::Type(_) => OperandKind::Type,
            Operand::Member(_) => OperandKind::Member,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: OpCode,
    #[serde(default, skip_serializing_if = "Operand::is_none")]
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: Operand::None,
        }
    }

    pub fn with(opcode: OpCode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    pub fn member(&self) -> Option<MemberToken> {
        match self.operand {
            Operand::Member(token) => Some(token),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            Operand::Int32(v) => write!(f, "{} {}", self.opcode, v),
            Operand::Int64(v) => write!(f, "{} {}", self.opcode, v),
            Operand::Float64(v) => write!(f, "{} {}", self.opcode, v),
            Operand::String(s) => write!(f, "{} {:?}", self.opcode, s),
            Operand::Local(i) => write!(f, "{} V_{}", self.opcode, i),
            Operand::Argument(i) => write!(f, "{} A_{}", self.opcode, i),
            Operand::Target(t) => write!(f, "{} #{}", self.opcode, t),
            Operand::Switch(ts) => write!(f, "{} ({:?})", self.opcode, ts),
            Operand::Type(t) => write!(f, "{} type#{}", self.opcode, t.0),
            Operand::Member(m) => write!(f, "{} member#{}", self.opcode, m.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    pub return_type: TypeSig,
    #[serde(default)]
    pub parameters: Vec<TypeSig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MethodBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A compiled module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Assembly name, also the scope of types this module defines
    pub name: String,
    /// Scope that defines the built-in types (`System.Int32`, ...)
    pub core_library: String,
    #[serde(default)]
    pub assembly_refs: IndexSet<String>,
    #[serde(default)]
    pub type_refs: IndexSet<TypeSig>,
    #[serde(default)]
    pub member_refs: IndexSet<MemberRef>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl Module {
    pub fn new(name: impl Into<String>, core_library: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            core_library: core_library.into(),
            assembly_refs: IndexSet::new(),
            type_refs: IndexSet::new(),
            member_refs: IndexSet::new(),
            types: Vec::new(),
        }
    }

    /// Read a module image and check its structural validity
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let text = fs::read_to_string(path.as_ref())?;
        let module: Module = serde_json::from_str(&text)?;
        verify_module(&module).map_err(|source| ModuleError::Invalid {
            module: module.name.clone(),
            source,
        })?;
        Ok(module)
    }

    /// Persist the module image
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ModuleError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Bring a type reference into this module's table. Idempotent.
    pub fn import_type(&mut self, ty: &TypeSig) -> TypeToken {
        self.note_scope(&ty.element().scope);
        let (index, _) = self.type_refs.insert_full(ty.clone());
        TypeToken(index as u32)
    }

    /// Bring a member reference into this module's table. Idempotent.
    pub fn import_member(&mut self, member: &MemberRef) -> MemberToken {
        self.note_scope(&member.declaring_type.scope);
        let (index, _) = self.member_refs.insert_full(member.clone());
        MemberToken(index as u32)
    }

    fn note_scope(&mut self, scope: &str) {
        if scope != self.name && !self.assembly_refs.contains(scope) {
            self.assembly_refs.insert(scope.to_string());
        }
    }

    pub fn type_ref(&self, token: TypeToken) -> Option<&TypeSig> {
        self.type_refs.get_index(token.0 as usize)
    }

    pub fn member(&self, token: MemberToken) -> Option<&MemberRef> {
        self.member_refs.get_index(token.0 as usize)
    }

    /// Token of an already-imported member, if any
    pub fn member_token(&self, member: &MemberRef) -> Option<MemberToken> {
        self.member_refs
            .get_index_of(member)
            .map(|index| MemberToken(index as u32))
    }

    pub fn type_token(&self, ty: &TypeSig) -> Option<TypeToken> {
        self.type_refs
            .get_index_of(ty)
            .map(|index| TypeToken(index as u32))
    }

    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.full_name() == full_name)
    }
}
