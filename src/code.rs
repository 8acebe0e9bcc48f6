//! The per-function instruction model.
//!
//! The parser flattens every function body into a `Vec<Instruction>`. Nested
//! constructs (if chains, loops, output blocks) stay flat: each opener is
//! followed by its body and a closing `End`, and branch heads carry the jump
//! offsets the parser computed, so the generator never re-scans for siblings
//! at run time.

use std::collections::HashMap;

use crate::value::Value;

/// Function name to its flat instruction list.
pub type FunctionTable = HashMap<String, Vec<Instruction>>;

/// Precomputed branch offsets, relative to the branch head's own position.
///
/// `on_false` is the length of the branch (head, body and `End`), landing on
/// the next branch head or just past the chain. `on_true` is the distance to
/// the first instruction after the entire chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Jump {
    pub on_true: usize,
    pub on_false: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    StartWith,
    EndWith,
}

/// A condition tree. Interior nodes are `&&` / `||`, leaves compare two
/// values, optionally negated (`!x.startWith(...)`).
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalNode {
    Logical {
        op: LogicalOp,
        left: Box<ConditionalNode>,
        right: Box<ConditionalNode>,
    },
    Comparison {
        op: ComparisonOp,
        negated: bool,
        left: Value,
        right: Value,
    },
}

/// One step of a function's program.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Verbatim output text.
    Literal(String),
    /// A Dockerfile command keyword, emitted verbatim.
    Command(String),
    /// Bind a new variable. `value` is `None` for a declared parameter,
    /// whose value arrives positionally at call time.
    Define { key: String, value: Option<Value> },
    /// Overwrite the most recent binding of `key`.
    Assign { key: String, value: Value },
    /// Resolve a value to a string and emit it.
    Replace(Value),
    /// Push an element onto an array-shaped binding.
    Append { array: String, element: Value },
    /// Sort an array-shaped binding lexicographically.
    Sort { array: String },
    /// Invoke another function with materialized arguments.
    CallProc { name: String, args: Vec<Value> },
    If { condition: ConditionalNode, jump: Jump },
    Elif { condition: ConditionalNode, jump: Jump },
    Else,
    /// Iterate an array, binding each element under `iterator`.
    For { iterator: String, iterable: Value },
    /// Divert the nested body's output to the file named by the value.
    Output(Value),
    /// Closes the body of `If` / `Elif` / `Else` / `For` / `Output`.
    End,
}

impl Instruction {
    /// Whether this is a parameter declaration (a `Define` with no value).
    pub fn is_parameter(&self) -> bool {
        matches!(self, Instruction::Define { value: None, .. })
    }

    /// Whether this instruction opens a nested body closed by `End`.
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            Instruction::If { .. }
                | Instruction::Elif { .. }
                | Instruction::Else
                | Instruction::For { .. }
                | Instruction::Output(_)
        )
    }
}
