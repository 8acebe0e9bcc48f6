//! File access behind traits, so the compiler core never touches the
//! filesystem directly. The CLI wires in the `Fs*` implementations; tests
//! use the in-memory ones.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    Read { path: String, message: String },
    Write { path: String, message: String },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::Read { path, message } => write!(f, "cannot read {path}: {message}"),
            FileError::Write { path, message } => write!(f, "cannot write {path}: {message}"),
        }
    }
}

impl std::error::Error for FileError {}

/// Source of template and JSON files.
pub trait FileReader {
    fn read(&self, path: &str) -> Result<String, FileError>;
}

/// Sink for generated Dockerfiles. `fragments` are concatenated verbatim.
pub trait FileWriter {
    fn write(&mut self, path: &str, fragments: &[String]) -> Result<(), FileError>;
}

/// Reads from the real filesystem.
#[derive(Debug, Default)]
pub struct FsReader;

impl FileReader for FsReader {
    fn read(&self, path: &str) -> Result<String, FileError> {
        fs::read_to_string(path).map_err(|err| FileError::Read {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

/// Writes to the real filesystem, creating parent directories as needed.
#[derive(Debug, Default)]
pub struct FsWriter;

impl FileWriter for FsWriter {
    fn write(&mut self, path: &str, fragments: &[String]) -> Result<(), FileError> {
        let write_err = |err: std::io::Error| FileError::Write {
            path: path.to_string(),
            message: err.to_string(),
        };
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        fs::write(path, fragments.concat()).map_err(write_err)
    }
}

/// In-memory reader for tests.
#[derive(Debug, Default)]
pub struct MemoryReader {
    files: HashMap<String, String>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &str, content: &str) {
        self.files.insert(path.to_string(), content.to_string());
    }
}

impl FileReader for MemoryReader {
    fn read(&self, path: &str) -> Result<String, FileError> {
        self.files.get(path).cloned().ok_or_else(|| FileError::Read {
            path: path.to_string(),
            message: "no such file".to_string(),
        })
    }
}

/// In-memory writer for tests. Keeps paths sorted for stable assertions.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    files: BTreeMap<String, String>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl FileWriter for MemoryWriter {
    fn write(&mut self, path: &str, fragments: &[String]) -> Result<(), FileError> {
        self.files.insert(path.to_string(), fragments.concat());
        Ok(())
    }
}
