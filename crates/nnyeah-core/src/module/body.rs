/*!
# Method Bodies

Instruction lists with index-based branch targets and exception regions.
[`MethodBody::splice`] keeps every index consistent when one instruction is
replaced by a sequence of a different length.
*/

use serde::{Deserialize, Serialize};

use super::{Instruction, Operand, TypeSig, TypeToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Catch,
    Filter,
    Finally,
    Fault,
}

impl HandlerKind {
    /// Stack depth on entry to the handler (the exception object for catch/filter)
    pub fn entry_depth(self) -> usize {
        match self {
            HandlerKind::Catch | HandlerKind::Filter => 1,
            HandlerKind::Finally | HandlerKind::Fault => 0,
        }
    }
}

/// Protected region; all bounds are instruction indices, ends exclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub kind: HandlerKind,
    pub try_start: usize,
    pub try_end: usize,
    pub handler_start: usize,
    pub handler_end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_type: Option<TypeToken>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    #[serde(default)]
    pub max_stack: u16,
    #[serde(default)]
    pub locals: Vec<TypeSig>,
    pub instructions: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    /// Append a local variable and return its slot
    pub fn add_local(&mut self, ty: TypeSig) -> u16 {
        self.locals.push(ty);
        (self.locals.len() - 1) as u16
    }

    /// Replace the instruction at `index` with `replacement`.
    ///
    /// Branch targets, switch tables and handler bounds past `index` shift by
    /// the length difference. A target that named the replaced instruction
    /// names the first replacement instruction, or its successor when the
    /// replacement is empty.
    pub fn splice(&mut self, index: usize, replacement: Vec<Instruction>) {
        assert!(index < self.instructions.len(), "splice index {index} out of range");

        let inserted = replacement.len();
        self.instructions.splice(index..=index, replacement);

        if inserted == 1 {
            return;
        }

        let shift = |target: usize| -> usize {
            if target > index {
                target + inserted - 1
            } else {
                target
            }
        };

        for instruction in &mut self.instructions {
            match &mut instruction.operand {
                Operand::Target(target) => *target = shift(*target),
                Operand::Switch(targets) => {
                    for target in targets.iter_mut() {
                        *target = shift(*target);
                    }
                }
                _ => {}
            }
        }

        for handler in &mut self.handlers {
            handler.try_start = shift(handler.try_start);
            handler.try_end = shift(handler.try_end);
            handler.handler_start = shift(handler.handler_start);
            handler.handler_end = shift(handler.handler_end);
        }
    }
}
