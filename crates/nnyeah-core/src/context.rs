/*!
# Module Context

Owns the modules taking part in one conversion: the legacy-defining module
(read-only, defines `System.nint`/`System.nuint`), the optional
successor-defining module (read-only, defines the built-in types the
replacements target), and the module under edit.
*/

use crate::module::{MemberRef, MemberToken, MethodBody, MethodDef, Module, TypeDef, TypeRef, TypeSig, TypeToken};
use crate::signature::MemberSignature;

/// The two legacy native-width integer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LegacyFamily {
    NInt,
    NUInt,
}

impl LegacyFamily {
    pub const ALL: [LegacyFamily; 2] = [LegacyFamily::NInt, LegacyFamily::NUInt];

    pub fn type_name(self) -> &'static str {
        match self {
            LegacyFamily::NInt => "nint",
            LegacyFamily::NUInt => "nuint",
        }
    }

    pub fn full_name(self) -> String {
        format!("System.{}", self.type_name())
    }

    /// Family of a type by full name
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        match full_name {
            "System.nint" => Some(LegacyFamily::NInt),
            "System.nuint" => Some(LegacyFamily::NUInt),
            _ => None,
        }
    }

    /// Family owning a member, if any
    pub fn of(signature: &MemberSignature) -> Option<Self> {
        Self::from_full_name(&signature.owner)
    }

    /// Successor type with the same representation
    pub fn successor(self, types: &TypeSystem) -> TypeSig {
        match self {
            LegacyFamily::NInt => types.int_ptr(),
            LegacyFamily::NUInt => types.uint_ptr(),
        }
    }
}

/// Shortcuts to commonly referenced types, scoped to the successor runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSystem {
    core_library: String,
    legacy_scope: String,
}

impl TypeSystem {
    pub fn new(core_library: impl Into<String>, legacy_scope: impl Into<String>) -> Self {
        Self {
            core_library: core_library.into(),
            legacy_scope: legacy_scope.into(),
        }
    }

    pub fn core_library(&self) -> &str {
        &self.core_library
    }

    pub fn core_type(&self, namespace: &str, name: &str) -> TypeRef {
        TypeRef::new(self.core_library.as_str(), namespace, name)
    }

    fn system(&self, name: &str) -> TypeSig {
        TypeSig::Named(self.core_type("System", name))
    }

    pub fn void(&self) -> TypeSig {
        self.system("Void")
    }

    pub fn boolean(&self) -> TypeSig {
        self.system("Boolean")
    }

    pub fn int32(&self) -> TypeSig {
        self.system("Int32")
    }

    pub fn int64(&self) -> TypeSig {
        self.system("Int64")
    }

    pub fn uint64(&self) -> TypeSig {
        self.system("UInt64")
    }

    pub fn double(&self) -> TypeSig {
        self.system("Double")
    }

    pub fn string(&self) -> TypeSig {
        self.system("String")
    }

    pub fn object(&self) -> TypeSig {
        self.system("Object")
    }

    pub fn int_ptr(&self) -> TypeSig {
        self.system("IntPtr")
    }

    pub fn uint_ptr(&self) -> TypeSig {
        self.system("UIntPtr")
    }

    pub fn decimal(&self) -> TypeSig {
        self.system("Decimal")
    }

    pub fn type_code(&self) -> TypeSig {
        self.system("TypeCode")
    }

    pub fn format_provider(&self) -> TypeSig {
        self.system("IFormatProvider")
    }

    pub fn number_styles(&self) -> TypeSig {
        TypeSig::Named(self.core_type("System.Globalization", "NumberStyles"))
    }

    pub fn nfloat(&self) -> TypeSig {
        TypeSig::Named(self.core_type("System.Runtime.InteropServices", "NFloat"))
    }

    /// Legacy family type as defined by the legacy module
    pub fn legacy(&self, family: LegacyFamily) -> TypeSig {
        TypeSig::named(&self.legacy_scope, "System", family.type_name())
    }
}

/// Location of a method in the module under edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    pub type_index: usize,
    pub method_index: usize,
}

pub struct ModuleContext {
    legacy: Module,
    successor: Option<Module>,
    edit: Module,
    types: TypeSystem,
}

impl ModuleContext {
    /// Context without a successor module; built-in types resolve against the
    /// edited module's own core library
    pub fn new(legacy: Module, edit: Module) -> Self {
        let types = TypeSystem::new(edit.core_library.as_str(), legacy.name.as_str());
        Self {
            legacy,
            successor: None,
            edit,
            types,
        }
    }

    /// Resolve built-in types against the successor-defining module
    pub fn with_successor(mut self, successor: Module) -> Self {
        self.types = TypeSystem::new(successor.name.as_str(), self.legacy.name.as_str());
        self.successor = Some(successor);
        self
    }

    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    pub fn legacy(&self) -> &Module {
        &self.legacy
    }

    pub fn successor(&self) -> Option<&Module> {
        self.successor.as_ref()
    }

    pub fn module(&self) -> &Module {
        &self.edit
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.edit
    }

    /// Give up the edited module, typically to persist it
    pub fn into_module(self) -> Module {
        self.edit
    }

    pub fn import_type(&mut self, ty: &TypeSig) -> TypeToken {
        self.edit.import_type(ty)
    }

    pub fn import_member(&mut self, member: &MemberRef) -> MemberToken {
        self.edit.import_member(member)
    }

    /// Every method with a body, in declaration order
    pub fn methods(&self) -> Vec<MethodHandle> {
        self.edit
            .types
            .iter()
            .enumerate()
            .flat_map(|(type_index, type_def)| {
                type_def
                    .methods
                    .iter()
                    .enumerate()
                    .filter(|(_, method)| method.body.is_some())
                    .map(move |(method_index, _)| MethodHandle {
                        type_index,
                        method_index,
                    })
            })
            .collect()
    }

    pub fn method(&self, handle: MethodHandle) -> (&TypeDef, &MethodDef) {
        let type_def = &self.edit.types[handle.type_index];
        (type_def, &type_def.methods[handle.method_index])
    }

    /// Detach a method body for editing; pair with [`ModuleContext::restore_body`]
    pub fn take_body(&mut self, handle: MethodHandle) -> Option<MethodBody> {
        self.edit.types[handle.type_index].methods[handle.method_index].body.take()
    }

    pub fn restore_body(&mut self, handle: MethodHandle, body: MethodBody) {
        self.edit.types[handle.type_index].methods[handle.method_index].body = Some(body);
    }

    /// Whether a type reference names a type defined by the legacy module
    pub fn is_legacy_type(&self, ty: &TypeRef) -> bool {
        ty.scope == self.legacy.name && LegacyFamily::from_full_name(&ty.full_name()).is_some()
    }

    /// Legacy-family methods declared by the legacy module
    pub fn legacy_signatures(&self) -> Vec<MemberSignature> {
        legacy_signatures(&self.legacy)
    }

    /// Whether the successor module defines `member`. Without a successor
    /// module every member is assumed to resolve.
    pub fn successor_defines(&self, member: &MemberRef) -> bool {
        self.successor
            .as_ref()
            .map_or(true, |successor| module_defines(successor, member))
    }
}

/// Signatures of the `System.nint`/`System.nuint` methods a module defines
pub fn legacy_signatures(module: &Module) -> Vec<MemberSignature> {
    module
        .types
        .iter()
        .filter(|t| LegacyFamily::from_full_name(&t.full_name()).is_some())
        .flat_map(|t| t.methods.iter().map(move |m| MemberSignature::of_method(t, m)))
        .collect()
}

/// Whether `module` defines a method matching `member`
pub fn module_defines(module: &Module, member: &MemberRef) -> bool {
    let wanted = MemberSignature::of(member);
    module
        .find_type(&wanted.owner)
        .map(|t| t.methods.iter().any(|m| MemberSignature::of_method(t, m) == wanted))
        .unwrap_or(false)
}
