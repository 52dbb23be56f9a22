//! Daemon service control
//!
//! The firmware's rc wraps every daemon in a named service that is stopped
//! and started with `service stop_<name>` / `service start_<name>`. Mount
//! changes happen while the daemon is down so nothing holds the binary open.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::Command;

use tracing::{info, warn};

use surrogate_core::{Result, ServiceAction, SurrogateError};

/// Stop/start primitive for a named service
pub trait ServiceControl {
    fn stop(&self, service: &str) -> Result<()>;
    fn start(&self, service: &str) -> Result<()>;
}

/// Service control through the firmware's `service` command
pub struct RcService {
    program: PathBuf,
}

impl RcService {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("service"),
        }
    }

    /// Use a different `service` executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, action: ServiceAction, service: &str) -> Result<()> {
        let failure = |message: String| SurrogateError::ServiceControl {
            action,
            service: service.to_string(),
            message,
        };

        let output = Command::new(&self.program)
            .arg(format!("{}_{}", action, service))
            .output()
            .map_err(|e| failure(format!("{}: {}", self.program.display(), e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(failure(format!("{} ({})", output.status, stderr.trim())))
        }
    }
}

impl Default for RcService {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceControl for RcService {
    fn stop(&self, service: &str) -> Result<()> {
        self.run(ServiceAction::Stop, service)
    }

    fn start(&self, service: &str) -> Result<()> {
        self.run(ServiceAction::Start, service)
    }
}

/// Run `body` with `service` stopped, then start it again.
///
/// The restart happens on every exit from `body`: success, error or panic.
/// Stop/start failures are logged and never replace the body's result.
/// Nothing restarts the service if this process itself is killed while the
/// body runs.
pub fn with_service_stopped<S, T, F>(ctl: &S, service: &str, body: F) -> Result<T>
where
    S: ServiceControl + ?Sized,
    F: FnOnce() -> Result<T>,
{
    info!("Shutting down {} service...", service);
    match ctl.stop(service) {
        Ok(()) => info!("{} service stopped", service),
        Err(e) => warn!("{}", e),
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(body));

    info!("Starting {} service...", service);
    match ctl.start(service) {
        Ok(()) => info!("{} service started", service),
        Err(e) => warn!("{}", e),
    }

    match outcome {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}
