//! Router key/value storage
//!
//! The client list lives in nvram. On the router it is read with
//! `nvram get <key>`; `NvramFile` reads a saved `nvram show` dump instead,
//! which is what development machines and tests use.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use surrogate_core::{Result, SurrogateError};

/// Read-only access to router settings
pub trait ClientListSource {
    /// Raw value stored under `key`; an unset key is an empty string.
    fn get(&self, key: &str) -> Result<String>;
}

/// nvram via the firmware's `nvram` command
pub struct NvramCommand {
    program: PathBuf,
}

impl NvramCommand {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("nvram"),
        }
    }
}

impl Default for NvramCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientListSource for NvramCommand {
    fn get(&self, key: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .args(["get", key])
            .output()
            .map_err(|e| SurrogateError::io(format!("nvram get {}", key), e))?;

        let mut value = String::from_utf8_lossy(&output.stdout).into_owned();
        if value.ends_with('\n') {
            value.pop();
        }
        Ok(value)
    }
}

/// nvram read from a `key=value` dump file
pub struct NvramFile {
    path: PathBuf,
}

impl NvramFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ClientListSource for NvramFile {
    fn get(&self, key: &str) -> Result<String> {
        let dump = fs::read_to_string(&self.path)
            .map_err(|e| SurrogateError::io(format!("read {:?}", self.path), e))?;

        Ok(dump
            .lines()
            .filter_map(|line| line.split_once('='))
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .last()
            .unwrap_or_default())
    }
}
