/*!
# Body Verification

Structural checks for method bodies: operand shapes, token/slot/target
ranges, and a control-flow analysis of evaluation-stack depth. The analysis
also yields the maximum depth, which is what the writer stores in
`max_stack` after a body has been rewritten.
*/

use std::collections::VecDeque;

use super::{
    FlowControl, Instruction, MemberRef, MethodBody, MethodDef, Module, OpCode, Operand, StackCount,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("instruction {index} ({opcode}): expected {expected:?} operand")]
    OperandMismatch {
        index: usize,
        opcode: OpCode,
        expected: super::OperandKind,
    },

    #[error("instruction {index}: token {token} out of range")]
    BadToken { index: usize, token: u32 },

    #[error("instruction {index}: local slot {slot} out of range")]
    BadLocal { index: usize, slot: u16 },

    #[error("instruction {index}: argument slot {slot} out of range")]
    BadArgument { index: usize, slot: u16 },

    #[error("instruction {index}: branch target {target} out of range")]
    BadTarget { index: usize, target: usize },

    #[error("exception handler {handler} has out-of-range bounds")]
    BadHandler { handler: usize },

    #[error("instruction {index}: stack underflow (depth {depth}, needs {needed})")]
    Underflow {
        index: usize,
        depth: usize,
        needed: usize,
    },

    #[error("instruction {index}: inconsistent stack depth ({first} vs {second})")]
    DepthMismatch {
        index: usize,
        first: usize,
        second: usize,
    },

    #[error("instruction {index}: stack not empty at return (depth {depth})")]
    NonEmptyReturn { index: usize, depth: usize },

    #[error("control falls off the end of the body")]
    FallsOffEnd,

    #[error("in {method}: {source}")]
    InMethod {
        method: String,
        #[source]
        source: Box<VerifyError>,
    },
}

/// Slots consumed and produced by one instruction or a sequence of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
}

impl StackEffect {
    pub fn new(pops: usize, pushes: usize) -> Self {
        Self { pops, pushes }
    }

    pub fn net(&self) -> isize {
        self.pushes as isize - self.pops as isize
    }

    /// Effect of running `self` then `next`
    pub fn then(self, next: StackEffect) -> StackEffect {
        // inputs `next` needs beyond what `self` left behind come from below
        let borrowed = next.pops.saturating_sub(self.pushes);
        StackEffect {
            pops: self.pops + borrowed,
            pushes: self.pushes + borrowed - next.pops + next.pushes,
        }
    }
}

/// Stack effect of invoking `member` with `opcode`
pub fn member_effect(opcode: OpCode, member: &MemberRef) -> StackEffect {
    let params = member.parameters.len();
    match opcode {
        OpCode::Newobj => StackEffect::new(params, 1),
        _ => {
            let this = usize::from(member.has_this);
            let result = usize::from(!member.return_type.ty.is_void());
            StackEffect::new(params + this, result)
        }
    }
}

/// Stack effect of a single instruction. `returns_value` describes the
/// enclosing method and only matters for `ret`.
pub fn instruction_effect(
    instruction: &Instruction,
    module: &Module,
    returns_value: bool,
) -> Option<StackEffect> {
    let behaviour = instruction.opcode.stack_behaviour();
    match (behaviour.pops, behaviour.pushes) {
        (StackCount::Fixed(pops), StackCount::Fixed(pushes)) => {
            Some(StackEffect::new(pops as usize, pushes as usize))
        }
        _ if instruction.opcode == OpCode::Ret => Some(StackEffect::new(usize::from(returns_value), 0)),
        _ => {
            let member = module.member(instruction.member()?)?;
            Some(member_effect(instruction.opcode, member))
        }
    }
}

fn check_operands(
    index: usize,
    instruction: &Instruction,
    module: &Module,
    method: &MethodDef,
    body: &MethodBody,
) -> Result<(), VerifyError> {
    let expected = instruction.opcode.operand_kind();
    if instruction.operand.kind() != expected {
        return Err(VerifyError::OperandMismatch {
            index,
            opcode: instruction.opcode,
            expected,
        });
    }

    let len = body.instructions.len();
    let check_target = |target: usize| {
        if target < len {
            Ok(())
        } else {
            Err(VerifyError::BadTarget { index, target })
        }
    };

    match &instruction.operand {
        Operand::Member(token) if module.member(*token).is_none() => {
            Err(VerifyError::BadToken { index, token: token.0 })
        }
        Operand::Type(token) if module.type_ref(*token).is_none() => {
            Err(VerifyError::BadToken { index, token: token.0 })
        }
        Operand::Local(slot) if *slot as usize >= body.locals.len() => {
            Err(VerifyError::BadLocal { index, slot: *slot })
        }
        Operand::Argument(slot) => {
            let count = method.parameters.len() + usize::from(!method.is_static);
            if (*slot as usize) < count {
                Ok(())
            } else {
                Err(VerifyError::BadArgument { index, slot: *slot })
            }
        }
        Operand::Target(target) => check_target(*target),
        Operand::Switch(targets) => targets.iter().try_for_each(|t| check_target(*t)),
        _ => Ok(()),
    }
}

/// Verify one method body and return its maximum stack depth
pub fn verify_body(module: &Module, method: &MethodDef, body: &MethodBody) -> Result<u16, VerifyError> {
    let len = body.instructions.len();
    for (index, instruction) in body.instructions.iter().enumerate() {
        check_operands(index, instruction, module, method, body)?;
    }
    for (handler_index, handler) in body.handlers.iter().enumerate() {
        let ordered = handler.try_start < handler.try_end && handler.handler_start < handler.handler_end;
        if !ordered || handler.try_end > len || handler.handler_end > len {
            return Err(VerifyError::BadHandler { handler: handler_index });
        }
    }
    if len == 0 {
        return Ok(0);
    }

    let returns_value = !method.return_type.is_void();
    let mut depths: Vec<Option<usize>> = vec![None; len];
    let mut worklist = VecDeque::new();
    let mut max_depth = 0usize;

    let enqueue = |depths: &mut Vec<Option<usize>>,
                   worklist: &mut VecDeque<usize>,
                   index: usize,
                   depth: usize|
     -> Result<(), VerifyError> {
        if index >= len {
            return Err(VerifyError::FallsOffEnd);
        }
        match depths[index] {
            Some(existing) if existing != depth => Err(VerifyError::DepthMismatch {
                index,
                first: existing,
                second: depth,
            }),
            Some(_) => Ok(()),
            None => {
                depths[index] = Some(depth);
                worklist.push_back(index);
                Ok(())
            }
        }
    };

    enqueue(&mut depths, &mut worklist, 0, 0)?;
    for handler in &body.handlers {
        enqueue(&mut depths, &mut worklist, handler.handler_start, handler.kind.entry_depth())?;
    }

    while let Some(index) = worklist.pop_front() {
        let depth = depths[index].unwrap_or_default();
        let instruction = &body.instructions[index];
        let effect = instruction_effect(instruction, module, returns_value).ok_or(VerifyError::BadToken {
            index,
            token: instruction.member().map(|t| t.0).unwrap_or_default(),
        })?;

        if depth < effect.pops {
            return Err(VerifyError::Underflow {
                index,
                depth,
                needed: effect.pops,
            });
        }
        let after = depth - effect.pops + effect.pushes;
        max_depth = max_depth.max(after).max(depth);

        let flow = instruction.opcode.flow();
        if flow == FlowControl::Return && after != 0 {
            return Err(VerifyError::NonEmptyReturn { index, depth: after });
        }

        match (&instruction.operand, flow) {
            (Operand::Target(target), FlowControl::Leave) => {
                enqueue(&mut depths, &mut worklist, *target, 0)?;
            }
            (Operand::Target(target), _) => {
                enqueue(&mut depths, &mut worklist, *target, after)?;
            }
            (Operand::Switch(targets), _) => {
                for target in targets {
                    enqueue(&mut depths, &mut worklist, *target, after)?;
                }
            }
            _ => {}
        }

        if instruction.opcode.falls_through() {
            enqueue(&mut depths, &mut worklist, index + 1, after)?;
        }
    }

    Ok(max_depth.min(u16::MAX as usize) as u16)
}

/// Verify every method body in the module
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    for type_def in &module.types {
        for method in &type_def.methods {
            if let Some(body) = &method.body {
                verify_body(module, method, body).map_err(|source| VerifyError::InMethod {
                    method: format!("{}::{}", type_def.full_name(), method.name),
                    source: Box::new(source),
                })?;
            }
        }
    }
    Ok(())
}
