//! Error types for dnsmasq-surrogate

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while installing, removing or launching the surrogate.
///
/// Lenient parsing (client list, config text) never produces one of these;
/// malformed input is dropped or passed through instead.
#[derive(Error, Debug)]
pub enum SurrogateError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("could not {op} {}: {message}", mount_paths(.source_path.as_deref(), .target))]
    Mount {
        op: MountOp,
        source_path: Option<PathBuf>,
        target: PathBuf,
        message: String,
    },

    #[error("could not {action} service {service}: {message}")]
    ServiceControl {
        action: ServiceAction,
        service: String,
        message: String,
    },

    #[error("surrogate already installed over {target:?}; run remove first")]
    AlreadyInstalled { target: PathBuf },

    #[error("removal incomplete: {}", join_errors(.0))]
    PartialRemove(Vec<SurrogateError>),

    #[error("could not start {program:?}: {source}")]
    Exec {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SurrogateError {
    /// Wrap an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        SurrogateError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Mount-table operation that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountOp {
    Bind,
    Unmount,
}

impl std::fmt::Display for MountOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountOp::Bind => write!(f, "bind"),
            MountOp::Unmount => write!(f, "unmount"),
        }
    }
}

/// Service-control primitive that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceAction {
    Stop,
    Start,
}

impl std::fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceAction::Stop => write!(f, "stop"),
            ServiceAction::Start => write!(f, "start"),
        }
    }
}

fn mount_paths(source: Option<&Path>, target: &Path) -> String {
    match source {
        Some(source) => format!("{:?} -> {:?}", source, target),
        None => format!("{:?}", target),
    }
}

fn join_errors(errors: &[SurrogateError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SurrogateError>;
