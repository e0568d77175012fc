//! Catalogue entries that call into the successor runtime. The replacement
//! members are built against the context's type system; the legacy
//! native-width slots keep their meaning through `NativeIntegerAttribute`.

use super::{Action, AttributeFactory, CatalogueBuilder, Emit};
use crate::context::{LegacyFamily, TypeSystem};
use crate::error::CatalogueError;
use crate::module::{MemberRef, OpCode as Op, ParamSig, TypeRef, TypeSig};

struct FamilyMembers<'a> {
    family: LegacyFamily,
    types: &'a TypeSystem,
    attributes: AttributeFactory<'a>,
    /// Legacy type name as it appears in signatures
    owner: String,
    /// `System.IntPtr` or `System.UIntPtr`
    successor: TypeSig,
}

impl<'a> FamilyMembers<'a> {
    fn new(family: LegacyFamily, types: &'a TypeSystem, attributes: AttributeFactory<'a>) -> Self {
        Self {
            family,
            types,
            attributes,
            owner: family.full_name(),
            successor: family.successor(types),
        }
    }

    fn successor_ref(&self) -> TypeRef {
        self.successor.element().clone()
    }

    /// Successor type as a parameter tagged native-width
    fn native_param(&self, ty: TypeSig) -> ParamSig {
        ParamSig::new(ty).with_attribute((self.attributes)(&[true]))
    }

    fn instance(&self, name: &str, return_type: TypeSig) -> MemberRef {
        MemberRef::instance(self.successor_ref(), name, return_type)
    }

    fn call(member: MemberRef) -> Action {
        Action::Replace(vec![Emit::member(Op::Call, member)])
    }

    fn signed(&self) -> bool {
        self.family == LegacyFamily::NInt
    }

    fn register(&self, builder: &mut CatalogueBuilder) -> Result<(), CatalogueError> {
        self.register_comparison(builder)?;
        self.register_formatting(builder)?;
        self.register_parsing(builder)?;
        self.register_conversions(builder)?;
        self.register_type_code(builder)
    }

    fn register_comparison(&self, builder: &mut CatalogueBuilder) -> Result<(), CatalogueError> {
        let owner = &self.owner;
        let t = self.types;

        builder.insert(
            &format!("System.Int32 {owner}::CompareTo({owner})"),
            Self::call(self.instance("CompareTo", t.int32()).param(self.native_param(self.successor.clone()))),
        )?;
        builder.insert(
            &format!("System.Int32 {owner}::CompareTo(System.Object)"),
            Self::call(self.instance("CompareTo", t.int32()).param_type(t.object())),
        )?;
        builder.insert(
            &format!("System.Boolean {owner}::Equals(System.Object)"),
            Self::call(self.instance("Equals", t.boolean()).param_type(t.object())),
        )?;
        builder.insert(
            &format!("System.Boolean {owner}::Equals({owner})"),
            Self::call(self.instance("Equals", t.boolean()).param(self.native_param(self.successor.clone()))),
        )?;
        builder.insert(
            &format!("System.Int32 {owner}::GetHashCode()"),
            Self::call(self.instance("GetHashCode", t.int32())),
        )?;
        Ok(())
    }

    fn register_formatting(&self, builder: &mut CatalogueBuilder) -> Result<(), CatalogueError> {
        let owner = &self.owner;
        let t = self.types;
        let overloads: [(&str, Vec<TypeSig>); 4] = [
            ("", vec![]),
            ("System.IFormatProvider", vec![t.format_provider()]),
            ("System.String", vec![t.string()]),
            ("System.String,System.IFormatProvider", vec![t.string(), t.format_provider()]),
        ];

        for (params, param_types) in overloads {
            let member = param_types
                .into_iter()
                .fold(self.instance("ToString", t.string()), MemberRef::param_type);
            builder.insert(&format!("System.String {owner}::ToString({params})"), Self::call(member))?;
        }
        Ok(())
    }

    fn register_parsing(&self, builder: &mut CatalogueBuilder) -> Result<(), CatalogueError> {
        let owner = &self.owner;
        let t = self.types;
        let overloads: [(&str, Vec<TypeSig>); 4] = [
            ("System.String", vec![t.string()]),
            ("System.String,System.IFormatProvider", vec![t.string(), t.format_provider()]),
            ("System.String,System.Globalization.NumberStyles", vec![t.string(), t.number_styles()]),
            (
                "System.String,System.Globalization.NumberStyles,System.IFormatProvider",
                vec![t.string(), t.number_styles(), t.format_provider()],
            ),
        ];

        for (params, param_types) in overloads {
            let parse = MemberRef::new(self.successor_ref(), "Parse", self.successor.clone())
                .return_attribute((self.attributes)(&[true]));
            let member = param_types.into_iter().fold(parse, MemberRef::param_type);
            builder.insert(&format!("{owner} {owner}::Parse({params})"), Self::call(member))?;
        }

        let result = ParamSig::new(self.successor.clone().by_ref())
            .out()
            .with_attribute((self.attributes)(&[true]));
        let try_parse = || MemberRef::new(self.successor_ref(), "TryParse", t.boolean());

        builder.insert(
            &format!("System.Boolean {owner}::TryParse(System.String,{owner}&)"),
            Self::call(try_parse().param_type(t.string()).param(result.clone())),
        )?;
        builder.insert(
            &format!(
                "System.Boolean {owner}::TryParse(System.String,System.Globalization.NumberStyles,System.IFormatProvider,{owner}&)"
            ),
            Self::call(
                try_parse()
                    .param_type(t.string())
                    .param_type(t.number_styles())
                    .param_type(t.format_provider())
                    .param(result),
            ),
        )?;
        Ok(())
    }

    fn register_conversions(&self, builder: &mut CatalogueBuilder) -> Result<(), CatalogueError> {
        let owner = &self.owner;
        let t = self.types;
        let decimal = t.decimal();
        let decimal_ref = decimal.element().clone();
        let (wide, widen, narrow) = if self.signed() {
            (t.int64(), Op::ConvI8, Op::ConvI)
        } else {
            (t.uint64(), Op::ConvU8, Op::ConvU)
        };

        let to_decimal = MemberRef::new(decimal_ref.clone(), "op_Implicit", decimal.clone()).param_type(wide.clone());
        builder.insert(
            &format!("System.Decimal {owner}::op_Implicit({owner})"),
            Action::Replace(vec![Emit::op(widen), Emit::member(Op::Call, to_decimal)]),
        )?;

        let from_decimal = MemberRef::new(decimal_ref, "op_Explicit", wide).param_type(decimal);
        builder.insert(
            &format!("{owner} {owner}::op_Explicit(System.Decimal)"),
            Action::Replace(vec![Emit::member(Op::Call, from_decimal), Emit::op(narrow)]),
        )?;

        let nfloat_ctor = MemberRef::instance(t.nfloat().element().clone(), ".ctor", t.void()).param_type(t.double());
        let mut to_nfloat = if self.signed() {
            vec![Emit::op(Op::ConvR8)]
        } else {
            vec![Emit::op(Op::ConvRUn), Emit::op(Op::ConvR8)]
        };
        to_nfloat.push(Emit::member(Op::Newobj, nfloat_ctor));
        builder.insert(
            &format!("System.nfloat {owner}::op_Implicit({owner})"),
            Action::Replace(to_nfloat),
        )?;
        Ok(())
    }

    /// `GetTypeCode` is called on an address. The value is loaded, widened
    /// into a temporary, and the 64-bit type's method is called on that.
    fn register_type_code(&self, builder: &mut CatalogueBuilder) -> Result<(), CatalogueError> {
        let owner = &self.owner;
        let t = self.types;
        let (wide, widen) = if self.signed() {
            (t.int64(), Op::ConvI8)
        } else {
            (t.uint64(), Op::ConvU8)
        };
        let get_type_code = MemberRef::instance(wide.element().clone(), "GetTypeCode", t.type_code());

        builder.insert(
            &format!("System.TypeCode {owner}::GetTypeCode()"),
            Action::Replace(vec![
                Emit::ty(Op::Ldobj, self.successor.clone()),
                Emit::op(widen),
                Emit::temp(Op::Stloc, wide.clone()),
                Emit::temp(Op::Ldloca, wide),
                Emit::member(Op::Call, get_type_code),
            ]),
        )?;
        Ok(())
    }
}

pub fn register(
    builder: &mut CatalogueBuilder,
    types: &TypeSystem,
    attributes: AttributeFactory<'_>,
) -> Result<(), CatalogueError> {
    for family in LegacyFamily::ALL {
        FamilyMembers::new(family, types, attributes).register(builder)?;
    }
    Ok(())
}
