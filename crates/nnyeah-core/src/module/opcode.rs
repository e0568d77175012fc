/*!
# Opcodes

The subset of CIL opcodes the rewriter reads and emits, with the stack
behaviour and control-flow class of each. The textual form is the standard
mnemonic (`conv.i`, `ldc.i4.1`), which is also how opcodes are persisted.
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of stack slots an opcode pops or pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackCount {
    Fixed(u8),
    /// Depends on the operand (calls) or the enclosing method (`ret`)
    Varies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehaviour {
    pub pops: StackCount,
    pub pushes: StackCount,
}

/// How control leaves an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    Next,
    Call,
    Branch,
    CondBranch,
    Switch,
    Return,
    Throw,
    /// `leave`: empties the stack and jumps
    Leave,
    /// `endfinally`: no fallthrough, stack must be empty
    EndFinally,
    /// `endfilter`: consumes the filter verdict, no fallthrough
    EndFilter,
}

/// Operand shape an opcode expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Int32,
    Int64,
    Float64,
    String,
    Local,
    Argument,
    Target,
    Switch,
    Type,
    Member,
}

macro_rules! opcodes {
    ($( $variant:ident => $mnemonic:literal, $pops:expr, $pushes:expr, $flow:ident, $operand:ident; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OpCode {
            $($variant,)*
        }

        impl OpCode {
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(OpCode::$variant => $mnemonic,)*
                }
            }

            pub fn stack_behaviour(self) -> StackBehaviour {
                match self {
                    $(OpCode::$variant => StackBehaviour { pops: $pops, pushes: $pushes },)*
                }
            }

            pub fn flow(self) -> FlowControl {
                match self {
                    $(OpCode::$variant => FlowControl::$flow,)*
                }
            }

            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $(OpCode::$variant => OperandKind::$operand,)*
                }
            }
        }
    };
}

use StackCount::{Fixed, Varies};

opcodes! {
    Nop => "nop", Fixed(0), Fixed(0), Next, None;
    Dup => "dup", Fixed(1), Fixed(2), Next, None;
    Pop => "pop", Fixed(1), Fixed(0), Next, None;

    Ldarg => "ldarg", Fixed(0), Fixed(1), Next, Argument;
    Ldarga => "ldarga", Fixed(0), Fixed(1), Next, Argument;
    Starg => "starg", Fixed(1), Fixed(0), Next, Argument;
    Ldloc => "ldloc", Fixed(0), Fixed(1), Next, Local;
    Ldloca => "ldloca", Fixed(0), Fixed(1), Next, Local;
    Stloc => "stloc", Fixed(1), Fixed(0), Next, Local;

    Ldnull => "ldnull", Fixed(0), Fixed(1), Next, None;
    LdcI4 => "ldc.i4", Fixed(0), Fixed(1), Next, Int32;
    LdcI4M1 => "ldc.i4.m1", Fixed(0), Fixed(1), Next, None;
    LdcI4_0 => "ldc.i4.0", Fixed(0), Fixed(1), Next, None;
    LdcI4_1 => "ldc.i4.1", Fixed(0), Fixed(1), Next, None;
    LdcI4_2 => "ldc.i4.2", Fixed(0), Fixed(1), Next, None;
    LdcI4_3 => "ldc.i4.3", Fixed(0), Fixed(1), Next, None;
    LdcI4_4 => "ldc.i4.4", Fixed(0), Fixed(1), Next, None;
    LdcI4_5 => "ldc.i4.5", Fixed(0), Fixed(1), Next, None;
    LdcI4_6 => "ldc.i4.6", Fixed(0), Fixed(1), Next, None;
    LdcI4_7 => "ldc.i4.7", Fixed(0), Fixed(1), Next, None;
    LdcI4_8 => "ldc.i4.8", Fixed(0), Fixed(1), Next, None;
    LdcI8 => "ldc.i8", Fixed(0), Fixed(1), Next, Int64;
    LdcR8 => "ldc.r8", Fixed(0), Fixed(1), Next, Float64;
    Ldstr => "ldstr", Fixed(0), Fixed(1), Next, String;

    Call => "call", Varies, Varies, Call, Member;
    Callvirt => "callvirt", Varies, Varies, Call, Member;
    Newobj => "newobj", Varies, Fixed(1), Call, Member;
    Ret => "ret", Varies, Fixed(0), Return, None;

    Br => "br", Fixed(0), Fixed(0), Branch, Target;
    Brfalse => "brfalse", Fixed(1), Fixed(0), CondBranch, Target;
    Brtrue => "brtrue", Fixed(1), Fixed(0), CondBranch, Target;
    Beq => "beq", Fixed(2), Fixed(0), CondBranch, Target;
    BneUn => "bne.un", Fixed(2), Fixed(0), CondBranch, Target;
    Bge => "bge", Fixed(2), Fixed(0), CondBranch, Target;
    BgeUn => "bge.un", Fixed(2), Fixed(0), CondBranch, Target;
    Bgt => "bgt", Fixed(2), Fixed(0), CondBranch, Target;
    BgtUn => "bgt.un", Fixed(2), Fixed(0), CondBranch, Target;
    Ble => "ble", Fixed(2), Fixed(0), CondBranch, Target;
    BleUn => "ble.un", Fixed(2), Fixed(0), CondBranch, Target;
    Blt => "blt", Fixed(2), Fixed(0), CondBranch, Target;
    BltUn => "blt.un", Fixed(2), Fixed(0), CondBranch, Target;
    Switch => "switch", Fixed(1), Fixed(0), Switch, Switch;
    Leave => "leave", Fixed(0), Fixed(0), Leave, Target;
    Endfinally => "endfinally", Fixed(0), Fixed(0), EndFinally, None;
    Endfilter => "endfilter", Fixed(1), Fixed(0), EndFilter, None;
    Throw => "throw", Fixed(1), Fixed(0), Throw, None;
    Rethrow => "rethrow", Fixed(0), Fixed(0), Throw, None;

    Add => "add", Fixed(2), Fixed(1), Next, None;
    Sub => "sub", Fixed(2), Fixed(1), Next, None;
    Mul => "mul", Fixed(2), Fixed(1), Next, None;
    Div => "div", Fixed(2), Fixed(1), Next, None;
    DivUn => "div.un", Fixed(2), Fixed(1), Next, None;
    Rem => "rem", Fixed(2), Fixed(1), Next, None;
    RemUn => "rem.un", Fixed(2), Fixed(1), Next, None;
    And => "and", Fixed(2), Fixed(1), Next, None;
    Or => "or", Fixed(2), Fixed(1), Next, None;
    Xor => "xor", Fixed(2), Fixed(1), Next, None;
    Shl => "shl", Fixed(2), Fixed(1), Next, None;
    Shr => "shr", Fixed(2), Fixed(1), Next, None;
    ShrUn => "shr.un", Fixed(2), Fixed(1), Next, None;
    AddOvf => "add.ovf", Fixed(2), Fixed(1), Next, None;
    AddOvfUn => "add.ovf.un", Fixed(2), Fixed(1), Next, None;
    SubOvf => "sub.ovf", Fixed(2), Fixed(1), Next, None;
    SubOvfUn => "sub.ovf.un", Fixed(2), Fixed(1), Next, None;
    MulOvf => "mul.ovf", Fixed(2), Fixed(1), Next, None;
    MulOvfUn => "mul.ovf.un", Fixed(2), Fixed(1), Next, None;
    Neg => "neg", Fixed(1), Fixed(1), Next, None;
    Not => "not", Fixed(1), Fixed(1), Next, None;

    Ceq => "ceq", Fixed(2), Fixed(1), Next, None;
    Cgt => "cgt", Fixed(2), Fixed(1), Next, None;
    CgtUn => "cgt.un", Fixed(2), Fixed(1), Next, None;
    Clt => "clt", Fixed(2), Fixed(1), Next, None;
    CltUn => "clt.un", Fixed(2), Fixed(1), Next, None;

    ConvI1 => "conv.i1", Fixed(1), Fixed(1), Next, None;
    ConvI2 => "conv.i2", Fixed(1), Fixed(1), Next, None;
    ConvI4 => "conv.i4", Fixed(1), Fixed(1), Next, None;
    ConvI8 => "conv.i8", Fixed(1), Fixed(1), Next, None;
    ConvI => "conv.i", Fixed(1), Fixed(1), Next, None;
    ConvU1 => "conv.u1", Fixed(1), Fixed(1), Next, None;
    ConvU2 => "conv.u2", Fixed(1), Fixed(1), Next, None;
    ConvU4 => "conv.u4", Fixed(1), Fixed(1), Next, None;
    ConvU8 => "conv.u8", Fixed(1), Fixed(1), Next, None;
    ConvU => "conv.u", Fixed(1), Fixed(1), Next, None;
    ConvR4 => "conv.r4", Fixed(1), Fixed(1), Next, None;
    ConvR8 => "conv.r8", Fixed(1), Fixed(1), Next, None;
    ConvRUn => "conv.r.un", Fixed(1), Fixed(1), Next, None;

    ConvOvfI1 => "conv.ovf.i1", Fixed(1), Fixed(1), Next, None;
    ConvOvfI2 => "conv.ovf.i2", Fixed(1), Fixed(1), Next, None;
    ConvOvfI4 => "conv.ovf.i4", Fixed(1), Fixed(1), Next, None;
    ConvOvfI8 => "conv.ovf.i8", Fixed(1), Fixed(1), Next, None;
    ConvOvfI => "conv.ovf.i", Fixed(1), Fixed(1), Next, None;
    ConvOvfU1 => "conv.ovf.u1", Fixed(1), Fixed(1), Next, None;
    ConvOvfU2 => "conv.ovf.u2", Fixed(1), Fixed(1), Next, None;
    ConvOvfU4 => "conv.ovf.u4", Fixed(1), Fixed(1), Next, None;
    ConvOvfU8 => "conv.ovf.u8", Fixed(1), Fixed(1), Next, None;
    ConvOvfU => "conv.ovf.u", Fixed(1), Fixed(1), Next, None;
    ConvOvfI1Un => "conv.ovf.i1.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfI2Un => "conv.ovf.i2.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfI4Un => "conv.ovf.i4.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfI8Un => "conv.ovf.i8.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfIUn => "conv.ovf.i.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfU1Un => "conv.ovf.u1.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfU2Un => "conv.ovf.u2.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfU4Un => "conv.ovf.u4.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfU8Un => "conv.ovf.u8.un", Fixed(1), Fixed(1), Next, None;
    ConvOvfUUn => "conv.ovf.u.un", Fixed(1), Fixed(1), Next, None;

    // field operands are member references without parameters
    Ldfld => "ldfld", Fixed(1), Fixed(1), Next, Member;
    Ldflda => "ldflda", Fixed(1), Fixed(1), Next, Member;
    Stfld => "stfld", Fixed(2), Fixed(0), Next, Member;
    Ldsfld => "ldsfld", Fixed(0), Fixed(1), Next, Member;
    Ldsflda => "ldsflda", Fixed(0), Fixed(1), Next, Member;
    Stsfld => "stsfld", Fixed(1), Fixed(0), Next, Member;

    LdindI1 => "ldind.i1", Fixed(1), Fixed(1), Next, None;
    LdindU1 => "ldind.u1", Fixed(1), Fixed(1), Next, None;
    LdindI2 => "ldind.i2", Fixed(1), Fixed(1), Next, None;
    LdindU2 => "ldind.u2", Fixed(1), Fixed(1), Next, None;
    LdindI4 => "ldind.i4", Fixed(1), Fixed(1), Next, None;
    LdindU4 => "ldind.u4", Fixed(1), Fixed(1), Next, None;
    LdindI8 => "ldind.i8", Fixed(1), Fixed(1), Next, None;
    LdindI => "ldind.i", Fixed(1), Fixed(1), Next, None;
    LdindR4 => "ldind.r4", Fixed(1), Fixed(1), Next, None;
    LdindR8 => "ldind.r8", Fixed(1), Fixed(1), Next, None;
    LdindRef => "ldind.ref", Fixed(1), Fixed(1), Next, None;
    StindI1 => "stind.i1", Fixed(2), Fixed(0), Next, None;
    StindI2 => "stind.i2", Fixed(2), Fixed(0), Next, None;
    StindI4 => "stind.i4", Fixed(2), Fixed(0), Next, None;
    StindI8 => "stind.i8", Fixed(2), Fixed(0), Next, None;
    StindI => "stind.i", Fixed(2), Fixed(0), Next, None;
    StindR4 => "stind.r4", Fixed(2), Fixed(0), Next, None;
    StindR8 => "stind.r8", Fixed(2), Fixed(0), Next, None;
    StindRef => "stind.ref", Fixed(2), Fixed(0), Next, None;

    Newarr => "newarr", Fixed(1), Fixed(1), Next, Type;
    Ldelema => "ldelema", Fixed(2), Fixed(1), Next, Type;
    Ldelem => "ldelem", Fixed(2), Fixed(1), Next, Type;
    LdelemI1 => "ldelem.i1", Fixed(2), Fixed(1), Next, None;
    LdelemU1 => "ldelem.u1", Fixed(2), Fixed(1), Next, None;
    LdelemI2 => "ldelem.i2", Fixed(2), Fixed(1), Next, None;
    LdelemU2 => "ldelem.u2", Fixed(2), Fixed(1), Next, None;
    LdelemI4 => "ldelem.i4", Fixed(2), Fixed(1), Next, None;
    LdelemU4 => "ldelem.u4", Fixed(2), Fixed(1), Next, None;
    LdelemI8 => "ldelem.i8", Fixed(2), Fixed(1), Next, None;
    LdelemI => "ldelem.i", Fixed(2), Fixed(1), Next, None;
    LdelemR4 => "ldelem.r4", Fixed(2), Fixed(1), Next, None;
    LdelemR8 => "ldelem.r8", Fixed(2), Fixed(1), Next, None;
    LdelemRef => "ldelem.ref", Fixed(2), Fixed(1), Next, None;
    Stelem => "stelem", Fixed(3), Fixed(0), Next, Type;
    StelemI1 => "stelem.i1", Fixed(3), Fixed(0), Next, None;
    StelemI2 => "stelem.i2", Fixed(3), Fixed(0), Next, None;
    StelemI4 => "stelem.i4", Fixed(3), Fixed(0), Next, None;
    StelemI8 => "stelem.i8", Fixed(3), Fixed(0), Next, None;
    StelemI => "stelem.i", Fixed(3), Fixed(0), Next, None;
    StelemR4 => "stelem.r4", Fixed(3), Fixed(0), Next, None;
    StelemR8 => "stelem.r8", Fixed(3), Fixed(0), Next, None;
    StelemRef => "stelem.ref", Fixed(3), Fixed(0), Next, None;
    Sizeof => "sizeof", Fixed(0), Fixed(1), Next, Type;

    Ldobj => "ldobj", Fixed(1), Fixed(1), Next, Type;
    Stobj => "stobj", Fixed(2), Fixed(0), Next, Type;
    Initobj => "initobj", Fixed(1), Fixed(0), Next, Type;
    Box => "box", Fixed(1), Fixed(1), Next, Type;
    UnboxAny => "unbox.any", Fixed(1), Fixed(1), Next, Type;
    Castclass => "castclass", Fixed(1), Fixed(1), Next, Type;
    Isinst => "isinst", Fixed(1), Fixed(1), Next, Type;
    Ldlen => "ldlen", Fixed(1), Fixed(1), Next, None;
}

impl OpCode {
    /// Opcodes that invoke a member and are therefore candidates for rewriting
    pub fn is_invocation(self) -> bool {
        matches!(self, OpCode::Call | OpCode::Callvirt | OpCode::Newobj)
    }

    /// Whether execution can continue with the next instruction
    pub fn falls_through(self) -> bool {
        !matches!(
            self.flow(),
            FlowControl::Branch
                | FlowControl::Return
                | FlowControl::Throw
                | FlowControl::Leave
                | FlowControl::EndFinally
                | FlowControl::EndFilter
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown opcode mnemonic `{0}`")]
pub struct UnknownOpCode(pub String);

impl FromStr for OpCode {
    type Err = UnknownOpCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpCode::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic() == s)
            .ok_or_else(|| UnknownOpCode(s.to_string()))
    }
}

impl Serialize for OpCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.mnemonic())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
