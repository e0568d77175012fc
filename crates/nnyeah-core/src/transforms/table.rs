//! Catalogue entries that need no type references: opcode lowerings,
//! identity conversions, pass-through and diagnostic entries.

use super::{Action, CatalogueBuilder, Emit};
use crate::context::LegacyFamily;
use crate::error::CatalogueError;
use crate::module::OpCode as Op;
use crate::report::DiagnosticCode;

/// `System.nint` lowerings. An empty sequence removes the call.
pub const NINT: &[(&str, &[Op])] = &[
    ("System.nuint System.nint::op_Explicit(System.nint)", &[Op::ConvU]),
    ("System.nint System.nint::op_Explicit(System.IntPtr)", &[]),
    ("System.IntPtr System.nint::op_Explicit(System.nint)", &[]),
    ("System.nint System.nint::op_Explicit(System.nuint)", &[Op::ConvI]),
    ("System.nint System.nint::op_Implicit(System.SByte)", &[Op::ConvI]),
    ("System.SByte System.nint::op_Explicit(System.nint)", &[Op::ConvI1]),
    ("System.nint System.nint::op_Implicit(System.Byte)", &[Op::ConvU]),
    ("System.Byte System.nint::op_Explicit(System.nint)", &[Op::ConvU1]),
    ("System.nint System.nint::op_Implicit(System.Char)", &[Op::ConvU]),
    ("System.Char System.nint::op_Explicit(System.nint)", &[Op::ConvU2]),
    ("System.nint System.nint::op_Implicit(System.Int16)", &[Op::ConvI]),
    ("System.Int16 System.nint::op_Explicit(System.nint)", &[Op::ConvI2]),
    ("System.nint System.nint::op_Explicit(System.UInt16)", &[Op::ConvU]),
    ("System.UInt16 System.nint::op_Explicit(System.nint)", &[Op::ConvU2]),
    ("System.nint System.nint::op_Implicit(System.Int32)", &[Op::ConvI]),
    ("System.Int32 System.nint::op_Explicit(System.nint)", &[Op::ConvI4]),
    ("System.nint System.nint::op_Explicit(System.UInt32)", &[Op::ConvU]),
    ("System.UInt32 System.nint::op_Explicit(System.nint)", &[Op::ConvU4]),
    ("System.nint System.nint::op_Explicit(System.Int64)", &[Op::ConvI]),
    ("System.Int64 System.nint::op_Implicit(System.nint)", &[Op::ConvI8]),
    ("System.nint System.nint::op_Explicit(System.UInt64)", &[Op::ConvI]),
    ("System.UInt64 System.nint::op_Explicit(System.nint)", &[Op::ConvI8]),
    ("System.nint System.nint::op_Explicit(System.Single)", &[Op::ConvI]),
    ("System.Single System.nint::op_Implicit(System.nint)", &[Op::ConvR4]),
    ("System.nint System.nint::op_Explicit(System.Double)", &[Op::ConvI]),
    ("System.Double System.nint::op_Implicit(System.nint)", &[Op::ConvR8]),
    ("System.nint System.nint::op_UnaryPlus(System.nint)", &[]),
    ("System.nint System.nint::op_UnaryNegation(System.nint)", &[Op::Neg]),
    ("System.nint System.nint::op_OnesComplement(System.nint)", &[Op::Not]),
    ("System.nint System.nint::op_Increment(System.nint)", &[Op::LdcI4_1, Op::Add]),
    ("System.nint System.nint::op_Decrement(System.nint)", &[Op::LdcI4_1, Op::Sub]),
    ("System.nint System.nint::op_Addition(System.nint,System.nint)", &[Op::Add]),
    ("System.nint System.nint::op_Subtraction(System.nint,System.nint)", &[Op::Sub]),
    ("System.nint System.nint::op_Multiply(System.nint,System.nint)", &[Op::Mul]),
    ("System.nint System.nint::op_Division(System.nint,System.nint)", &[Op::Div]),
    ("System.nint System.nint::op_Modulus(System.nint,System.nint)", &[Op::Rem]),
    ("System.nint System.nint::op_BitwiseAnd(System.nint,System.nint)", &[Op::And]),
    ("System.nint System.nint::op_BitwiseOr(System.nint,System.nint)", &[Op::Or]),
    ("System.nint System.nint::op_ExclusiveOr(System.nint,System.nint)", &[Op::Xor]),
    ("System.nint System.nint::op_LeftShift(System.nint,System.Int32)", &[Op::Shl]),
    ("System.nint System.nint::op_RightShift(System.nint,System.Int32)", &[Op::Shr]),
    ("System.Boolean System.nint::op_Equality(System.nint,System.nint)", &[Op::Ceq]),
    ("System.Boolean System.nint::op_Inequality(System.nint,System.nint)", &[Op::Ceq, Op::LdcI4_0, Op::Ceq]),
    ("System.Boolean System.nint::op_LessThan(System.nint,System.nint)", &[Op::Clt]),
    ("System.Boolean System.nint::op_GreaterThan(System.nint,System.nint)", &[Op::Cgt]),
    ("System.Boolean System.nint::op_LessThanOrEqual(System.nint,System.nint)", &[Op::Cgt, Op::LdcI4_0, Op::Ceq]),
    ("System.Boolean System.nint::op_GreaterThanOrEqual(System.nint,System.nint)", &[Op::Clt, Op::LdcI4_0, Op::Ceq]),
    ("System.Void System.nint::.ctor(System.nint)", &[]),
    ("System.Void System.nint::.ctor(System.Int32)", &[Op::ConvI]),
    ("System.Void System.nint::.ctor(System.Int64)", &[Op::ConvI]),
];

/// `System.nuint` lowerings, using the unsigned opcode forms
pub const NUINT: &[(&str, &[Op])] = &[
    ("System.Void System.nuint::.ctor(System.UInt32)", &[Op::ConvU]),
    ("System.Void System.nuint::.ctor(System.UInt64)", &[Op::ConvU]),
    ("System.Void System.nuint::.ctor(System.nuint)", &[]),
    ("System.nuint System.nuint::op_Explicit(System.IntPtr)", &[Op::ConvU]),
    ("System.IntPtr System.nuint::op_Explicit(System.nuint)", &[Op::ConvI]),
    ("System.nuint System.nuint::op_Explicit(System.UIntPtr)", &[]),
    ("System.UIntPtr System.nuint::op_Explicit(System.nuint)", &[]),
    ("System.nuint System.nuint::op_Explicit(System.SByte)", &[Op::ConvI]),
    ("System.SByte System.nuint::op_Explicit(System.nuint)", &[Op::ConvI1]),
    ("System.nuint System.nuint::op_Implicit(System.Byte)", &[Op::ConvU]),
    ("System.Byte System.nuint::op_Explicit(System.nuint)", &[Op::ConvU1]),
    ("System.nuint System.nuint::op_Implicit(System.Char)", &[Op::ConvU]),
    ("System.Char System.nuint::op_Explicit(System.nuint)", &[Op::ConvU2]),
    ("System.nuint System.nuint::op_Explicit(System.Int16)", &[Op::ConvI]),
    ("System.Int16 System.nuint::op_Explicit(System.nuint)", &[Op::ConvI2]),
    ("System.nuint System.nuint::op_Implicit(System.UInt16)", &[Op::ConvU]),
    ("System.UInt16 System.nuint::op_Explicit(System.nuint)", &[Op::ConvU2]),
    ("System.nuint System.nuint::op_Explicit(System.Int32)", &[Op::ConvI]),
    ("System.Int32 System.nuint::op_Explicit(System.nuint)", &[Op::ConvI4]),
    ("System.nuint System.nuint::op_Implicit(System.UInt32)", &[Op::ConvU]),
    ("System.UInt32 System.nuint::op_Explicit(System.nuint)", &[Op::ConvU4]),
    ("System.nuint System.nuint::op_Explicit(System.Int64)", &[Op::ConvU]),
    ("System.Int64 System.nuint::op_Explicit(System.nuint)", &[Op::ConvU8]),
    ("System.nuint System.nuint::op_Explicit(System.UInt64)", &[Op::ConvU]),
    ("System.UInt64 System.nuint::op_Implicit(System.nuint)", &[Op::ConvU8]),
    ("System.nuint System.nuint::op_Explicit(System.Single)", &[Op::ConvU]),
    ("System.Single System.nuint::op_Implicit(System.nuint)", &[Op::ConvRUn, Op::ConvR4]),
    ("System.nuint System.nuint::op_Explicit(System.Double)", &[Op::ConvU]),
    ("System.Double System.nuint::op_Implicit(System.nuint)", &[Op::ConvRUn, Op::ConvR8]),
    ("System.nuint System.nuint::op_UnaryPlus(System.nuint)", &[]),
    ("System.nuint System.nuint::op_OnesComplement(System.nuint)", &[Op::Not]),
    ("System.nuint System.nuint::op_Increment(System.nuint)", &[Op::LdcI4_1, Op::Add]),
    ("System.nuint System.nuint::op_Decrement(System.nuint)", &[Op::LdcI4_1, Op::Sub]),
    ("System.nuint System.nuint::op_Addition(System.nuint,System.nuint)", &[Op::Add]),
    ("System.nuint System.nuint::op_Subtraction(System.nuint,System.nuint)", &[Op::Sub]),
    ("System.nuint System.nuint::op_Multiply(System.nuint,System.nuint)", &[Op::Mul]),
    ("System.nuint System.nuint::op_Division(System.nuint,System.nuint)", &[Op::DivUn]),
    ("System.nuint System.nuint::op_Modulus(System.nuint,System.nuint)", &[Op::RemUn]),
    ("System.nuint System.nuint::op_BitwiseAnd(System.nuint,System.nuint)", &[Op::And]),
    ("System.nuint System.nuint::op_BitwiseOr(System.nuint,System.nuint)", &[Op::Or]),
    ("System.nuint System.nuint::op_ExclusiveOr(System.nuint,System.nuint)", &[Op::Xor]),
    ("System.nuint System.nuint::op_LeftShift(System.nuint,System.Int32)", &[Op::Shl]),
    ("System.nuint System.nuint::op_RightShift(System.nuint,System.Int32)", &[Op::ShrUn]),
    ("System.Boolean System.nuint::op_Equality(System.nuint,System.nuint)", &[Op::Ceq]),
    ("System.Boolean System.nuint::op_Inequality(System.nuint,System.nuint)", &[Op::Ceq, Op::LdcI4_0, Op::Ceq]),
    ("System.Boolean System.nuint::op_LessThan(System.nuint,System.nuint)", &[Op::CltUn]),
    ("System.Boolean System.nuint::op_GreaterThan(System.nuint,System.nuint)", &[Op::CgtUn]),
    ("System.Boolean System.nuint::op_LessThanOrEqual(System.nuint,System.nuint)", &[Op::CgtUn, Op::LdcI4_0, Op::Ceq]),
    ("System.Boolean System.nuint::op_GreaterThanOrEqual(System.nuint,System.nuint)", &[Op::CltUn, Op::LdcI4_0, Op::Ceq]),
];

/// Explicit `IConvertible` members: return type, method, parameters
pub const CONVERTIBLE: &[(&str, &str, &str)] = &[
    ("System.Boolean", "ToBoolean", "System.IFormatProvider"),
    ("System.Byte", "ToByte", "System.IFormatProvider"),
    ("System.Char", "ToChar", "System.IFormatProvider"),
    ("System.DateTime", "ToDateTime", "System.IFormatProvider"),
    ("System.Decimal", "ToDecimal", "System.IFormatProvider"),
    ("System.Double", "ToDouble", "System.IFormatProvider"),
    ("System.Int16", "ToInt16", "System.IFormatProvider"),
    ("System.Int32", "ToInt32", "System.IFormatProvider"),
    ("System.Int64", "ToInt64", "System.IFormatProvider"),
    ("System.SByte", "ToSByte", "System.IFormatProvider"),
    ("System.Single", "ToSingle", "System.IFormatProvider"),
    ("System.UInt16", "ToUInt16", "System.IFormatProvider"),
    ("System.UInt32", "ToUInt32", "System.IFormatProvider"),
    ("System.UInt64", "ToUInt64", "System.IFormatProvider"),
    ("System.Object", "ToType", "System.Type,System.IFormatProvider"),
];

/// Bulk copies between a pointer and a legacy array. The successor runtime
/// has no equivalent without injected helpers.
fn copy_array_signatures(family: LegacyFamily) -> [String; 2] {
    let owner = family.full_name();
    [
        format!("System.Void {owner}::CopyArray(System.IntPtr,{owner}[],System.Int32,System.Int32)"),
        format!("System.Void {owner}::CopyArray({owner}[],System.Int32,System.IntPtr,System.Int32)"),
    ]
}

fn lowering(opcodes: &[Op]) -> Action {
    Action::Replace(opcodes.iter().copied().map(Emit::op).collect())
}

pub fn register(builder: &mut CatalogueBuilder) -> Result<(), CatalogueError> {
    for (family, entries) in [(LegacyFamily::NInt, NINT), (LegacyFamily::NUInt, NUINT)] {
        let owner = family.full_name();
        for (signature, opcodes) in entries {
            builder.insert(signature, lowering(opcodes))?;
        }

        builder.insert(&format!("System.Void {owner}::.cctor()"), Action::PassThrough)?;

        for (ret, name, params) in CONVERTIBLE {
            builder.insert(
                &format!("{ret} {owner}::System.IConvertible.{name}({params})"),
                Action::Diagnostic(DiagnosticCode::ConvertibleNarrowing),
            )?;
        }

        for signature in copy_array_signatures(family) {
            builder.insert(&signature, Action::Diagnostic(DiagnosticCode::UnsupportedArrayCopy))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::MemberSignature;
    use crate::transforms::sequence_effect;

    fn registered() -> crate::transforms::Catalogue {
        let mut builder = CatalogueBuilder::new();
        register(&mut builder).unwrap();
        builder.finish()
    }

    #[test]
    fn table_registers_without_duplicates() {
        let catalogue = registered();
        let expected = NINT.len() + NUINT.len() + 2 * (1 + CONVERTIBLE.len() + 2);
        assert_eq!(catalogue.len(), expected);
    }

    #[test]
    fn every_lowering_preserves_the_operator_shape() {
        // each entry replaces a static call taking the listed parameters and
        // returning one value, except constructors whose newobj also yields one
        for (signature, opcodes) in NINT.iter().chain(NUINT) {
            let parsed: MemberSignature = signature.parse().unwrap();
            let sequence: Vec<Emit> = opcodes.iter().copied().map(Emit::op).collect();
            let effect = sequence_effect(&sequence).unwrap();
            let params = parsed.parameters.len() as isize;
            assert!(effect.pops as isize <= params, "{signature}");
            assert_eq!(effect.net(), 1 - params, "{signature}");
        }
    }

    #[test]
    fn unsigned_family_uses_unsigned_opcodes() {
        let catalogue = registered();
        let lookup = |text: &str| catalogue.get(&text.parse().unwrap()).cloned();
        assert_eq!(
            lookup("System.nuint System.nuint::op_Division(System.nuint,System.nuint)"),
            Some(lowering(&[Op::DivUn]))
        );
        assert_eq!(
            lookup("System.nuint System.nuint::op_RightShift(System.nuint,System.Int32)"),
            Some(lowering(&[Op::ShrUn]))
        );
        assert_eq!(
            lookup("System.Double System.nuint::op_Implicit(System.nuint)"),
            Some(lowering(&[Op::ConvRUn, Op::ConvR8]))
        );
    }

    #[test]
    fn static_constructors_pass_through() {
        let catalogue = registered();
        for family in LegacyFamily::ALL {
            let signature = format!("System.Void {}::.cctor()", family.full_name());
            assert_eq!(catalogue.get(&signature.parse().unwrap()), Some(&Action::PassThrough));
        }
    }

    #[test]
    fn array_copies_are_diagnosed_for_both_families() {
        let catalogue = registered();
        for family in LegacyFamily::ALL {
            for signature in copy_array_signatures(family) {
                assert_eq!(
                    catalogue.get(&signature.parse().unwrap()),
                    Some(&Action::Diagnostic(DiagnosticCode::UnsupportedArrayCopy)),
                    "{signature}"
                );
            }
        }
    }
}
