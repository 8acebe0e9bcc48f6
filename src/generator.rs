//! The Myriad interpreter.
//!
//! Walks the flat instruction lists produced by the parser and collects
//! output fragments. Branch heads carry precomputed offsets, so taken and
//! skipped branches both land in constant time; only an empty `for` body
//! needs a forward scan. Output blocks run their body into a fresh fragment
//! buffer and hand it to the [`FileWriter`], so diverted text never leaks
//! into the caller's output.

mod resolve;

use std::fmt;

use crate::code::{FunctionTable, Instruction};
use crate::files::{FileError, FileWriter};
use crate::value::Value;

/// Recursion limit for function calls. Each Myriad-level call costs several
/// host frames, so the cap must stay small enough for the guard to fire
/// before the host stack runs out.
const MAX_CALL_DEPTH: usize = 64;

/// A name bound to a materialized value. The environment is a stack; inner
/// blocks push onto it and are truncated away when the block ends.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binding {
    pub(crate) name: String,
    pub(crate) value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateError {
    UndefinedFunction { name: String },
    UndeclaredVariable { name: String },
    WrongArgCount { name: String, expected: usize, got: usize },
    ShapeMismatch { name: String, expected: &'static str },
    ValueShape { expected: &'static str },
    IndexOutOfBounds { name: String, index: usize },
    MissingKey { name: String, key: String },
    MissingInitializer { name: String },
    CallDepthExceeded { name: String },
    Output(FileError),
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateError::UndefinedFunction { name } => {
                write!(f, "generate error: {name} is not defined")
            }
            GenerateError::UndeclaredVariable { name } => {
                write!(f, "generate error: {name} is not declared")
            }
            GenerateError::WrongArgCount {
                name,
                expected,
                got,
            } => write!(
                f,
                "generate error: {name} takes {expected} arguments but got {got}"
            ),
            GenerateError::ShapeMismatch { name, expected } => {
                write!(f, "generate error: {name} is not {expected}")
            }
            GenerateError::ValueShape { expected } => {
                write!(f, "generate error: expected {expected}")
            }
            GenerateError::IndexOutOfBounds { name, index } => {
                write!(f, "generate error: index {index} is out of bounds for {name}")
            }
            GenerateError::MissingKey { name, key } => {
                write!(f, "generate error: {name} has no key \"{key}\"")
            }
            GenerateError::MissingInitializer { name } => {
                write!(f, "generate error: {name} is defined without a value")
            }
            GenerateError::CallDepthExceeded { name } => {
                write!(f, "generate error: call depth exceeded in {name}")
            }
            GenerateError::Output(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for GenerateError {}

/// Run `main` with the given positional arguments and return the output
/// fragments it produced. Output blocks write through `writer` as a side
/// effect.
pub fn generate(
    table: &FunctionTable,
    writer: &mut dyn FileWriter,
    args: &[String],
) -> Result<Vec<String>, GenerateError> {
    let mut generator = Generator {
        table,
        writer,
        depth: 0,
    };
    let args = args
        .iter()
        .map(|arg| Value::Literal(arg.clone()))
        .collect();
    let mut out = Vec::new();
    generator.call_function("main", args, &mut out)?;
    Ok(out)
}

struct Generator<'a> {
    table: &'a FunctionTable,
    writer: &'a mut dyn FileWriter,
    depth: usize,
}

impl Generator<'_> {
    fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        out: &mut Vec<String>,
    ) -> Result<(), GenerateError> {
        let codes = self
            .table
            .get(name)
            .ok_or_else(|| GenerateError::UndefinedFunction {
                name: name.to_string(),
            })?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(GenerateError::CallDepthExceeded {
                name: name.to_string(),
            });
        }

        let expected = codes.iter().take_while(|c| c.is_parameter()).count();
        if args.len() != expected {
            return Err(GenerateError::WrongArgCount {
                name: name.to_string(),
                expected,
                got: args.len(),
            });
        }

        // Bind each argument to its parameter, then run the body with a
        // fresh environment; callees never see caller bindings.
        let mut env = Vec::with_capacity(expected);
        for (code, value) in codes.iter().zip(args) {
            if let Instruction::Define { key, .. } = code {
                env.push(Binding {
                    name: key.clone(),
                    value,
                });
            }
        }

        self.depth += 1;
        let result = self.exec_block(codes, expected, &mut env, out);
        self.depth -= 1;
        result.map(|_| ())
    }

    /// Execute instructions from `start` until the matching `End` (whose
    /// position is returned) or the end of the list.
    fn exec_block(
        &mut self,
        codes: &[Instruction],
        start: usize,
        env: &mut Vec<Binding>,
        out: &mut Vec<String>,
    ) -> Result<usize, GenerateError> {
        let mut pc = start;
        while pc < codes.len() {
            match &codes[pc] {
                Instruction::Literal(text) => {
                    out.push(text.clone());
                    pc += 1;
                }
                Instruction::Command(name) => {
                    out.push(name.clone());
                    pc += 1;
                }
                Instruction::Replace(value) => {
                    out.push(resolve::literal(env, value)?);
                    pc += 1;
                }
                Instruction::Define { key, value } => {
                    // Value-less defines are parameters; they are consumed in
                    // `call_function` and never executed here. One showing up
                    // mid-body means the instruction list is malformed.
                    let value = match value {
                        Some(value) => resolve::resolve_value(env, value)?,
                        None => {
                            return Err(GenerateError::MissingInitializer { name: key.clone() })
                        }
                    };
                    env.push(Binding {
                        name: key.clone(),
                        value,
                    });
                    pc += 1;
                }
                Instruction::Assign { key, value } => {
                    let value = resolve::resolve_value(env, value)?;
                    let binding = env
                        .iter_mut()
                        .rev()
                        .find(|b| b.name == *key)
                        .ok_or_else(|| GenerateError::UndeclaredVariable { name: key.clone() })?;
                    binding.value = value;
                    pc += 1;
                }
                Instruction::Append { array, element } => {
                    let element = resolve::literal(env, element)?;
                    let binding = env
                        .iter_mut()
                        .rev()
                        .find(|b| b.name == *array)
                        .ok_or_else(|| GenerateError::UndeclaredVariable {
                            name: array.clone(),
                        })?;
                    match &mut binding.value {
                        Value::Literals(items) => items.push(element),
                        _ => {
                            return Err(GenerateError::ShapeMismatch {
                                name: array.clone(),
                                expected: "an array",
                            })
                        }
                    }
                    pc += 1;
                }
                Instruction::Sort { array } => {
                    let binding = env
                        .iter_mut()
                        .rev()
                        .find(|b| b.name == *array)
                        .ok_or_else(|| GenerateError::UndeclaredVariable {
                            name: array.clone(),
                        })?;
                    match &mut binding.value {
                        Value::Literals(items) => items.sort(),
                        _ => {
                            return Err(GenerateError::ShapeMismatch {
                                name: array.clone(),
                                expected: "an array",
                            })
                        }
                    }
                    pc += 1;
                }
                Instruction::CallProc { name, args } => {
                    // Arguments materialize in the caller's environment.
                    let args = args
                        .iter()
                        .map(|arg| resolve::resolve_value(env, arg))
                        .collect::<Result<Vec<_>, _>>()?;
                    self.call_function(name, args, out)?;
                    pc += 1;
                }
                Instruction::If { condition, jump }
                | Instruction::Elif { condition, jump } => {
                    if resolve::eval_condition(env, condition)? {
                        let before = env.len();
                        self.exec_block(codes, pc + 1, env, out)?;
                        env.truncate(before);
                        pc += jump.on_true;
                    } else {
                        pc += jump.on_false;
                    }
                }
                Instruction::Else => {
                    let before = env.len();
                    let end = self.exec_block(codes, pc + 1, env, out)?;
                    env.truncate(before);
                    pc = end + 1;
                }
                Instruction::For { iterator, iterable } => {
                    let items = resolve::literals(env, iterable)?;
                    if items.is_empty() {
                        pc = skip_block(codes, pc + 1) + 1;
                    } else {
                        let before = env.len();
                        let mut end = pc + 1;
                        for item in items {
                            env.truncate(before);
                            env.push(Binding {
                                name: iterator.clone(),
                                value: Value::Literal(item),
                            });
                            end = self.exec_block(codes, pc + 1, env, out)?;
                        }
                        env.truncate(before);
                        pc = end + 1;
                    }
                }
                Instruction::Output(value) => {
                    let path = resolve::literal(env, value)?;
                    let before = env.len();
                    let mut body = Vec::new();
                    let end = self.exec_block(codes, pc + 1, env, &mut body)?;
                    env.truncate(before);
                    self.writer
                        .write(&path, &body)
                        .map_err(GenerateError::Output)?;
                    pc = end + 1;
                }
                Instruction::End => return Ok(pc),
            }
        }
        Ok(codes.len())
    }
}

/// Position of the `End` matching the block that starts at `start`, skipping
/// over nested blocks.
fn skip_block(codes: &[Instruction], start: usize) -> usize {
    let mut depth = 0usize;
    let mut pc = start;
    while pc < codes.len() {
        let code = &codes[pc];
        if code.opens_block() {
            depth += 1;
        } else if matches!(code, Instruction::End) {
            if depth == 0 {
                return pc;
            }
            depth -= 1;
        }
        pc += 1;
    }
    codes.len()
}
