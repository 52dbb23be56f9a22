//! Executable substitution
//!
//! Installing the surrogate takes two bind mounts:
//!
//! ```text
//! /usr/sbin/dnsmasq  --bind-->  /tmp/dnsmasq        (stable alias of the original)
//! <this executable>  --bind-->  /usr/sbin/dnsmasq   (rc now launches us)
//! ```
//!
//! No init script is touched and a reboot or `remove` undoes everything.
//! Neither operation is transactional: if the second mount fails the
//! original stays aliased but is not replaced, and the operator recovers
//! with `remove` followed by `install`.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use surrogate_core::{Layout, MountOp, Result, SurrogateError};

use crate::mount::{LinuxMounts, MountOps};
use crate::service::{with_service_stopped, RcService, ServiceControl};

/// Whether the surrogate is mounted over the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionState {
    NotInstalled,
    Installed,
}

/// Installs and removes the bind-mount trampoline
pub struct Substitution<M, S> {
    layout: Layout,
    mounts: M,
    service: S,
    self_exe: PathBuf,
}

impl Substitution<LinuxMounts, RcService> {
    /// Substitution against the live system, installing the running binary.
    pub fn system(layout: Layout) -> Result<Self> {
        let self_exe = std::env::current_exe()
            .map_err(|e| SurrogateError::io("resolve own executable", e))?;
        Ok(Self::new(layout, LinuxMounts::new(), RcService::new(), self_exe))
    }
}

impl<M: MountOps, S: ServiceControl> Substitution<M, S> {
    pub fn new(layout: Layout, mounts: M, service: S, self_exe: PathBuf) -> Self {
        Self {
            layout,
            mounts,
            service,
            self_exe,
        }
    }

    /// Current state, read from the mount table
    pub fn state(&self) -> Result<SubstitutionState> {
        let mounted = self
            .mounts
            .is_mounted(&self.layout.daemon_path)
            .map_err(|e| SurrogateError::io("read mount table", e))?;
        Ok(if mounted {
            SubstitutionState::Installed
        } else {
            SubstitutionState::NotInstalled
        })
    }

    /// Put the surrogate in place of the daemon and restart the service.
    ///
    /// Refuses to run while either path is already a mount point, so a
    /// repeated install cannot stack mounts on top of each other.
    pub fn install(&self) -> Result<()> {
        info!("Starting dnsmasq substitute installation...");
        let layout = &self.layout;

        for target in [&layout.daemon_path, &layout.alias_path] {
            match self.mounts.is_mounted(target) {
                Ok(true) => {
                    return Err(SurrogateError::AlreadyInstalled {
                        target: target.clone(),
                    })
                }
                Ok(false) => {}
                Err(e) => warn!("Could not read mount table: {}; assuming not installed", e),
            }
        }

        info!("Creating temporary marker file at {:?}", layout.alias_path);
        OpenOptions::new()
            .write(true)
            .create(true)
            .open(&layout.alias_path)
            .map_err(|e| {
                SurrogateError::io(format!("create marker {:?}", layout.alias_path), e)
            })?;

        with_service_stopped(&self.service, &layout.service, || {
            info!(
                "Binding original dnsmasq ({:?}) to temporary name ({:?})",
                layout.daemon_path, layout.alias_path
            );
            self.bind(&layout.daemon_path, &layout.alias_path)?;

            info!(
                "Binding current executable ({:?}) to original dnsmasq ({:?})",
                self.self_exe, layout.daemon_path
            );
            self.bind(&self.self_exe, &layout.daemon_path).map_err(|e| {
                error!("dnsmasq is aliased but not substituted; run remove, then install again");
                e
            })?;

            // before the restart, so the first launch already sees it
            info!("Creating hosts directory {:?}", layout.hosts_dir);
            if let Err(e) = fs::create_dir_all(&layout.hosts_dir) {
                warn!("Could not create {:?}: {}", layout.hosts_dir, e);
            }
            Ok(())
        })?;

        info!("dnsmasq substitute installation completed");
        Ok(())
    }

    /// Take both mounts down and restart the service.
    ///
    /// Each unmount is attempted even if the other fails.
    pub fn remove(&self) -> Result<()> {
        info!("Starting dnsmasq surrogate removal...");
        let layout = &self.layout;

        with_service_stopped(&self.service, &layout.service, || {
            let mut failures = Vec::new();

            for target in [&layout.daemon_path, &layout.alias_path] {
                info!("Unmounting {:?}", target);
                match self.mounts.detach(target) {
                    Ok(()) => {
                        info!("Unmounted {:?}", target);
                        if target == &layout.alias_path {
                            remove_marker(target);
                        }
                    }
                    Err(e) => {
                        error!("Could not unmount {:?}: {}", target, e);
                        failures.push(SurrogateError::Mount {
                            op: MountOp::Unmount,
                            source_path: None,
                            target: target.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            if failures.is_empty() {
                info!("dnsmasq surrogate removal completed");
                Ok(())
            } else {
                Err(SurrogateError::PartialRemove(failures))
            }
        })
    }

    fn bind(&self, source: &Path, target: &Path) -> Result<()> {
        self.mounts.bind(source, target).map_err(|e| {
            error!("Could not bind {:?} to {:?}: {}", source, target, e);
            SurrogateError::Mount {
                op: MountOp::Bind,
                source_path: Some(source.to_path_buf()),
                target: target.to_path_buf(),
                message: e.to_string(),
            }
        })
    }
}

/// Delete the empty placeholder `install` created under the alias.
fn remove_marker(path: &Path) {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() == 0 => {
            if let Err(e) = fs::remove_file(path) {
                warn!("Could not delete marker {:?}: {}", path, e);
            }
        }
        Ok(_) => warn!("Leaving {:?} in place: not an empty marker file", path),
        Err(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebuild::tests::scratch_layout;
    use crate::service::tests::RecordingService;
    use std::cell::RefCell;
    use std::io;

    /// In-memory mount table: target → source
    #[derive(Default)]
    struct FakeMounts {
        table: RefCell<Vec<(PathBuf, PathBuf)>>,
        fail_bind_on: Option<PathBuf>,
        fail_detach_on: Option<PathBuf>,
    }

    impl FakeMounts {
        fn targets(&self) -> Vec<PathBuf> {
            self.table.borrow().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    impl MountOps for FakeMounts {
        fn bind(&self, source: &Path, target: &Path) -> io::Result<()> {
            if self.fail_bind_on.as_deref() == Some(target) || !target.exists() {
                return Err(io::Error::from_raw_os_error(libc::EPERM));
            }
            self.table
                .borrow_mut()
                .push((target.to_path_buf(), source.to_path_buf()));
            Ok(())
        }

        fn detach(&self, target: &Path) -> io::Result<()> {
            if self.fail_detach_on.as_deref() == Some(target) {
                return Err(io::Error::from_raw_os_error(libc::EBUSY));
            }
            let mut table = self.table.borrow_mut();
            match table.iter().rposition(|(t, _)| t == target) {
                Some(index) => {
                    table.remove(index);
                    Ok(())
                }
                None => Err(io::Error::from_raw_os_error(libc::EINVAL)),
            }
        }

        fn is_mounted(&self, target: &Path) -> io::Result<bool> {
            Ok(self.table.borrow().iter().any(|(t, _)| t == target))
        }
    }

    fn substitution(
        mounts: FakeMounts,
    ) -> (tempfile::TempDir, Substitution<FakeMounts, RecordingService>) {
        let (temp, layout) = scratch_layout();
        fs::remove_dir(&layout.hosts_dir).unwrap();
        fs::create_dir_all(layout.alias_path.parent().unwrap()).unwrap();
        fs::create_dir_all(layout.daemon_path.parent().unwrap()).unwrap();
        fs::write(&layout.daemon_path, b"\x7fELF dnsmasq").unwrap();
        let self_exe = temp.path().join("dnsmasq-surrogate");
        fs::write(&self_exe, b"\x7fELF surrogate").unwrap();

        let sub = Substitution::new(layout, mounts, RecordingService::default(), self_exe);
        (temp, sub)
    }

    #[test]
    fn test_install_mounts_in_order() {
        let (_temp, sub) = substitution(FakeMounts::default());
        sub.install().unwrap();

        let layout = &sub.layout;
        assert_eq!(
            *sub.mounts.table.borrow(),
            vec![
                (layout.alias_path.clone(), layout.daemon_path.clone()),
                (layout.daemon_path.clone(), sub.self_exe.clone()),
            ]
        );
        assert!(layout.hosts_dir.is_dir());
        assert_eq!(sub.state().unwrap(), SubstitutionState::Installed);
        assert_eq!(
            *sub.service.calls.borrow(),
            vec!["stop_dnsmasq", "start_dnsmasq"]
        );
    }

    /// Notes whether a directory exists at each start
    struct DirCheckingService {
        dir: PathBuf,
        on_start: RefCell<Vec<bool>>,
    }

    impl ServiceControl for DirCheckingService {
        fn stop(&self, _service: &str) -> Result<()> {
            Ok(())
        }

        fn start(&self, _service: &str) -> Result<()> {
            self.on_start.borrow_mut().push(self.dir.is_dir());
            Ok(())
        }
    }

    #[test]
    fn test_hosts_dir_exists_before_restart() {
        let (_temp, sub) = substitution(FakeMounts::default());
        let service = DirCheckingService {
            dir: sub.layout.hosts_dir.clone(),
            on_start: RefCell::new(Vec::new()),
        };
        let sub = Substitution::new(sub.layout, sub.mounts, service, sub.self_exe);

        sub.install().unwrap();
        assert_eq!(*sub.service.on_start.borrow(), vec![true]);
    }

    #[test]
    fn test_marker_failure_stops_before_service() {
        let (_temp, sub) = substitution(FakeMounts::default());
        fs::create_dir(&sub.layout.alias_path).unwrap();

        let err = sub.install().unwrap_err();
        assert!(matches!(err, SurrogateError::Io { .. }));
        assert!(sub.service.calls.borrow().is_empty());
        assert!(sub.mounts.targets().is_empty());
    }

    #[test]
    fn test_hosts_dir_failure_is_not_fatal() {
        let (temp, mut sub) = substitution(FakeMounts::default());
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        sub.layout.hosts_dir = blocker.join("hosts");

        sub.install().unwrap();
        assert!(!sub.layout.hosts_dir.exists());
        assert_eq!(sub.state().unwrap(), SubstitutionState::Installed);
        assert_eq!(
            *sub.service.calls.borrow(),
            vec!["stop_dnsmasq", "start_dnsmasq"]
        );
    }

    #[test]
    fn test_install_then_remove_restores_state() {
        let (_temp, sub) = substitution(FakeMounts::default());
        assert_eq!(sub.state().unwrap(), SubstitutionState::NotInstalled);
        assert!(!sub.layout.alias_path.exists());

        sub.install().unwrap();
        sub.remove().unwrap();

        assert!(sub.mounts.targets().is_empty());
        assert!(!sub.layout.alias_path.exists());
        assert_eq!(sub.state().unwrap(), SubstitutionState::NotInstalled);
        assert_eq!(
            fs::read(&sub.layout.daemon_path).unwrap(),
            b"\x7fELF dnsmasq".to_vec()
        );
        assert_eq!(sub.service.calls.borrow().len(), 4);
    }

    #[test]
    fn test_second_install_is_rejected() {
        let (_temp, sub) = substitution(FakeMounts::default());
        sub.install().unwrap();

        let err = sub.install().unwrap_err();
        assert!(matches!(err, SurrogateError::AlreadyInstalled { .. }));
        assert_eq!(sub.mounts.targets().len(), 2);
        // rejected before the service was touched
        assert_eq!(sub.service.calls.borrow().len(), 2);
    }

    #[test]
    fn test_failed_first_bind_restarts_service() {
        let (_temp, mut sub) = substitution(FakeMounts::default());
        sub.mounts.fail_bind_on = Some(sub.layout.alias_path.clone());

        let err = sub.install().unwrap_err();
        assert!(matches!(err, SurrogateError::Mount { op: MountOp::Bind, .. }));
        assert!(sub.mounts.targets().is_empty());
        assert!(!sub.layout.hosts_dir.exists());
        assert_eq!(
            *sub.service.calls.borrow(),
            vec!["stop_dnsmasq", "start_dnsmasq"]
        );
    }

    #[test]
    fn test_failed_second_bind_leaves_partial_state() {
        let (_temp, mut sub) = substitution(FakeMounts::default());
        sub.mounts.fail_bind_on = Some(sub.layout.daemon_path.clone());

        let err = sub.install().unwrap_err();
        assert!(matches!(err, SurrogateError::Mount { op: MountOp::Bind, .. }));
        assert_eq!(sub.mounts.targets(), vec![sub.layout.alias_path.clone()]);
        assert_eq!(sub.service.calls.borrow().last().unwrap(), "start_dnsmasq");

        // documented recovery path
        sub.mounts.fail_bind_on = None;
        let err = sub.remove().unwrap_err();
        assert!(matches!(err, SurrogateError::PartialRemove(ref f) if f.len() == 1));
        assert!(sub.mounts.targets().is_empty());
        sub.install().unwrap();
        assert_eq!(sub.state().unwrap(), SubstitutionState::Installed);
    }

    #[test]
    fn test_remove_attempts_both_unmounts() {
        let (_temp, mut sub) = substitution(FakeMounts::default());
        sub.install().unwrap();
        sub.mounts.fail_detach_on = Some(sub.layout.daemon_path.clone());

        let err = sub.remove().unwrap_err();
        match err {
            SurrogateError::PartialRemove(failures) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].to_string().contains("unmount"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // the alias was still unmounted
        assert_eq!(sub.mounts.targets(), vec![sub.layout.daemon_path.clone()]);
        assert_eq!(sub.service.calls.borrow().last().unwrap(), "start_dnsmasq");
    }

    #[test]
    fn test_remove_keeps_non_marker_alias() {
        let (_temp, sub) = substitution(FakeMounts::default());
        sub.install().unwrap();
        fs::write(&sub.layout.alias_path, b"operator data").unwrap();

        sub.remove().unwrap();
        assert!(sub.mounts.targets().is_empty());
        assert!(sub.layout.alias_path.exists());
    }
}
