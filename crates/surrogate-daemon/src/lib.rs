//! Surrogate Daemon - dnsmasq substitution and launch trampoline
//!
//! This crate provides:
//! - The bind-mount substitution that puts this binary in place of dnsmasq
//! - Config rebuild from the persisted config, the nvram client list and
//!   the supplementary hosts directory
//! - The launch trampoline that execs the real daemon afterwards
//!
//! # Architecture
//!
//! ```text
//! rc ──> /usr/sbin/dnsmasq ──(bind mount)──> dnsmasq-surrogate
//!                                                 │ rebuild /etc/dnsmasq.conf
//!                                                 │ exec
//!                                                 ▼
//!        /tmp/dnsmasq ──(bind mount)──> original dnsmasq binary
//! ```
//!
//! Everything that touches the OS sits behind a small trait
//! ([`MountOps`], [`ServiceControl`], [`ClientListSource`], [`ProcessImage`])
//! so the flows can run against a scratch directory.

pub mod exec;
pub mod mount;
pub mod nvram;
pub mod rebuild;
pub mod service;
pub mod substitute;
pub mod trampoline;

pub use exec::{Execvp, ProcessImage};
pub use mount::{LinuxMounts, MountOps};
pub use nvram::{ClientListSource, NvramCommand, NvramFile};
pub use rebuild::{build_config, discover_hosts_files, rebuild_config, save_config};
pub use service::{with_service_stopped, RcService, ServiceControl};
pub use substitute::{Substitution, SubstitutionState};
pub use trampoline::{detect_mode, Mode, Trampoline};

/// Build identifier recorded by the build script
pub const BUILD_ID: &str = env!("SURROGATE_BUILD_ID");

/// One-line version string printed by `version`
pub fn version_string() -> String {
    format!("dnsmasq-surrogate {} ({})", env!("CARGO_PKG_VERSION"), BUILD_ID)
}
