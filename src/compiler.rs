//! The full lex-parse-generate pipeline behind a single entry point.

use std::fmt;

use crate::files::{FileError, FileReader, FileWriter};
use crate::generator::{self, GenerateError};
use crate::lexer::{self, LexError};
use crate::parser::{self, ParseError};

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Parse(ParseError),
    Generate(GenerateError),
    File(FileError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse(err) => err.fmt(f),
            CompileError::Generate(err) => err.fmt(f),
            CompileError::File(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        CompileError::Parse(err)
    }
}

impl From<LexError> for CompileError {
    fn from(err: LexError) -> Self {
        CompileError::Parse(ParseError::Lex(err))
    }
}

impl From<GenerateError> for CompileError {
    fn from(err: GenerateError) -> Self {
        CompileError::Generate(err)
    }
}

impl From<FileError> for CompileError {
    fn from(err: FileError) -> Self {
        CompileError::File(err)
    }
}

/// Compiles entry files. Imports and `JsonUnmarshal` resolve through the
/// reader; output blocks write through the writer.
pub struct Compiler<'a> {
    reader: &'a dyn FileReader,
    writer: &'a mut dyn FileWriter,
}

impl<'a> Compiler<'a> {
    pub fn new(reader: &'a dyn FileReader, writer: &'a mut dyn FileWriter) -> Self {
        Compiler { reader, writer }
    }

    /// Compile the template at `path`, passing `args` to `main`, and return
    /// the fragments `main` emitted to its own output.
    pub fn compile(&mut self, path: &str, args: &[String]) -> Result<Vec<String>, CompileError> {
        let table = parser::parse_file(path, self.reader)?;
        let fragments = generator::generate(&table, self.writer, args)?;
        Ok(fragments)
    }
}

/// Compile a template given directly as source text and return the
/// concatenated output of `main`.
pub fn compile_source(
    source: &str,
    reader: &dyn FileReader,
    writer: &mut dyn FileWriter,
    args: &[String],
) -> Result<String, CompileError> {
    let tokens = lexer::tokenize(source)?;
    let table = parser::parse_tokens(tokens, reader)?;
    let fragments = generator::generate(&table, writer, args)?;
    Ok(fragments.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{MemoryReader, MemoryWriter};

    #[test]
    fn compile_runs_the_whole_pipeline() {
        let reader = MemoryReader::new();
        let mut writer = MemoryWriter::new();
        let output = compile_source(
            "main(){ {{- FROM ubuntu -}} }",
            &reader,
            &mut writer,
            &[],
        )
        .unwrap();
        assert_eq!(output, "FROM ubuntu\n");
    }

    #[test]
    fn compile_reads_the_entry_file_through_the_reader() {
        let mut reader = MemoryReader::new();
        reader.add("app.myd", "main(){ {{- FROM alpine -}} }");
        let mut writer = MemoryWriter::new();
        let fragments = Compiler::new(&reader, &mut writer)
            .compile("app.myd", &[])
            .unwrap();
        assert_eq!(fragments.concat(), "FROM alpine\n");
    }

    #[test]
    fn every_stage_error_converts() {
        let reader = MemoryReader::new();
        let mut writer = MemoryWriter::new();

        let err = compile_source("main(){ $ }", &reader, &mut writer, &[]).unwrap_err();
        assert!(matches!(err, CompileError::Parse(ParseError::Lex(_))));

        let err = compile_source("main(){ x := }", &reader, &mut writer, &[]).unwrap_err();
        assert!(matches!(err, CompileError::Parse(ParseError::Syntax { .. })));

        let err =
            compile_source("main(){ {{- RUN {{ x }} -}} }", &reader, &mut writer, &[]).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Generate(GenerateError::UndeclaredVariable { .. })
        ));
    }
}
