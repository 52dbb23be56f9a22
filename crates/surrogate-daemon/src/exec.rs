//! Process image replacement

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// Replaces the running process with another program
pub trait ProcessImage {
    /// Exec `program` as `arg0` with `args`, inheriting the environment.
    ///
    /// Only returns if the replacement failed.
    fn replace(&self, program: &Path, arg0: &OsStr, args: &[OsString]) -> io::Error;
}

/// `execvp(3)` through `std::process::Command`
pub struct Execvp;

impl ProcessImage for Execvp {
    fn replace(&self, program: &Path, arg0: &OsStr, args: &[OsString]) -> io::Error {
        Command::new(program).arg0(arg0).args(args).exec()
    }
}
