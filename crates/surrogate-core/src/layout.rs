//! Filesystem layout of the surrogate on the router
//!
//! The paths are fixed for the firmware we target. They are bundled in a
//! value rather than read from globals so tests can point every component at
//! a temporary directory.

use std::path::{Path, PathBuf};

/// Alias the original daemon is bind-mounted onto.
///
/// The file name must stay exactly `dnsmasq`: the firmware's rc confirms and
/// kills the service by process name.
pub const ALIAS_PATH: &str = "/tmp/dnsmasq";

/// Where the firmware launches the daemon from
pub const DAEMON_PATH: &str = "/usr/sbin/dnsmasq";

/// Directory of operator-supplied hosts files (persistent flash)
pub const HOSTS_DIR: &str = "/jffs/dnsmasq-surrogate/hosts";

/// Config file the daemon reads at startup
pub const CONFIG_PATH: &str = "/etc/dnsmasq.conf";

/// Name of the rc service wrapping the daemon
pub const SERVICE_NAME: &str = "dnsmasq";

/// nvram key holding the operator's client list
pub const CLIENT_LIST_KEY: &str = "custom_clientlist";

/// Paths and names every component works against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Second, stable alias of the untouched daemon binary
    pub alias_path: PathBuf,
    /// Original daemon location; the surrogate is mounted over it
    pub daemon_path: PathBuf,
    /// Supplementary hosts files, discovered non-recursively
    pub hosts_dir: PathBuf,
    /// Canonical daemon config file
    pub config_path: PathBuf,
    /// rc service name used for stop/start
    pub service: String,
    /// Invocation name that selects launch mode
    pub reserved_name: String,
    /// nvram key of the client list
    pub client_list_key: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            alias_path: PathBuf::from(ALIAS_PATH),
            daemon_path: PathBuf::from(DAEMON_PATH),
            hosts_dir: PathBuf::from(HOSTS_DIR),
            config_path: PathBuf::from(CONFIG_PATH),
            service: SERVICE_NAME.to_string(),
            reserved_name: SERVICE_NAME.to_string(),
            client_list_key: CLIENT_LIST_KEY.to_string(),
        }
    }
}

impl Layout {
    /// Layout rooted in `root`, for tests and dry runs.
    ///
    /// Every path keeps its file name so name-based checks behave the same.
    pub fn rooted_at(root: &Path) -> Self {
        let reroot = |p: &str| root.join(p.trim_start_matches('/'));
        Self {
            alias_path: reroot(ALIAS_PATH),
            daemon_path: reroot(DAEMON_PATH),
            hosts_dir: reroot(HOSTS_DIR),
            config_path: reroot(CONFIG_PATH),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = Layout::default();
        assert_eq!(layout.alias_path, PathBuf::from("/tmp/dnsmasq"));
        assert_eq!(layout.daemon_path, PathBuf::from("/usr/sbin/dnsmasq"));
        assert_eq!(layout.reserved_name, "dnsmasq");
    }

    #[test]
    fn test_rooted_layout_keeps_file_names() {
        let layout = Layout::rooted_at(Path::new("/scratch"));
        assert_eq!(layout.alias_path, PathBuf::from("/scratch/tmp/dnsmasq"));
        assert_eq!(layout.config_path, PathBuf::from("/scratch/etc/dnsmasq.conf"));
        assert_eq!(layout.alias_path.file_name().unwrap(), "dnsmasq");
        assert_eq!(layout.service, "dnsmasq");
    }
}
