//! # myriad
//!
//! A small templating language that compiles to Dockerfiles.
//!
//! A template is a set of functions whose bodies mix control flow with
//! literal Dockerfile blocks delimited by `{{-` and `-}}`. Compilation runs
//! three stages:
//!
//! 1. [`lexer`] turns source text into tokens, switching between expression
//!    mode and literal Dockerfile mode as it crosses block delimiters.
//! 2. [`parser`] builds one flat instruction list per function, resolves
//!    imports and `JsonUnmarshal` files, and precomputes branch offsets.
//! 3. [`generator`] interprets `main`, collecting output fragments and
//!    writing diverted output blocks through a [`FileWriter`].
//!
//! [`compiler::Compiler`] ties the stages together; [`compile_source`] is
//! the one-call variant used by tests and embedders.

pub mod code;
pub mod compiler;
pub mod files;
pub mod generator;
pub mod lexer;
pub mod parser;
pub mod value;

pub use compiler::{compile_source, CompileError, Compiler};
pub use files::{FileError, FileReader, FileWriter, FsReader, FsWriter, MemoryReader, MemoryWriter};
pub use generator::{generate, GenerateError};
pub use lexer::{tokenize, LexError, Token, TokenKind};
pub use parser::{parse_file, parse_tokens, ParseError};
pub use value::Value;
