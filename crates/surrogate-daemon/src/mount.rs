//! Bind-mount primitives
//!
//! `MountOps` is the seam between the substitution logic and the kernel.
//! `LinuxMounts` issues the real syscalls:
//!
//! ```c
//! int mount(const char *source, const char *target, const char *fstype,
//!           unsigned long flags, const void *data);
//! int umount2(const char *target, int flags);
//! ```

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Mount-table operations used by the substitution
pub trait MountOps {
    /// Make `target` resolve to the file at `source`.
    fn bind(&self, source: &Path, target: &Path) -> io::Result<()>;

    /// Lazily detach whatever is mounted on `target`.
    ///
    /// A busy target is detached once its last user goes away instead of
    /// failing with `EBUSY`.
    fn detach(&self, target: &Path) -> io::Result<()>;

    /// Whether `target` is currently a mount point
    fn is_mounted(&self, target: &Path) -> io::Result<bool>;
}

/// Real mount table of the current mount namespace
pub struct LinuxMounts {
    mountinfo: PathBuf,
}

impl LinuxMounts {
    pub fn new() -> Self {
        Self {
            mountinfo: PathBuf::from("/proc/self/mountinfo"),
        }
    }
}

impl Default for LinuxMounts {
    fn default() -> Self {
        Self::new()
    }
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

impl MountOps for LinuxMounts {
    fn bind(&self, source: &Path, target: &Path) -> io::Result<()> {
        let c_source = c_path(source)?;
        let c_target = c_path(target)?;
        debug!("mount({:?}, {:?}, MS_BIND)", source, target);

        let result = unsafe {
            libc::mount(
                c_source.as_ptr(),
                c_target.as_ptr(),
                std::ptr::null(),
                libc::MS_BIND,
                std::ptr::null(),
            )
        };

        if result < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn detach(&self, target: &Path) -> io::Result<()> {
        let c_target = c_path(target)?;
        debug!("umount2({:?}, MNT_DETACH)", target);

        let result = unsafe { libc::umount2(c_target.as_ptr(), libc::MNT_DETACH) };

        if result < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn is_mounted(&self, target: &Path) -> io::Result<bool> {
        let table = fs::read_to_string(&self.mountinfo)?;
        Ok(mountinfo_contains(&table, target))
    }
}

/// Scan `/proc/self/mountinfo` text for a mount point.
///
/// The fifth field is the mount point, with spaces and other special
/// characters escaped as octal (`\040`).
pub fn mountinfo_contains(table: &str, target: &Path) -> bool {
    let wanted = target.as_os_str().as_bytes();
    table
        .lines()
        .filter_map(|line| line.split(' ').nth(4))
        .any(|field| unescape_octal(field) == wanted)
}

fn unescape_octal(field: &str) -> Vec<u8> {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                out.push(value as u8);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTINFO: &str = "\
22 1 179:2 / / rw,relatime - ext4 /dev/root rw
40 22 0:19 / /tmp rw,nosuid,nodev - tmpfs tmpfs rw
61 40 31:3 /usr/sbin/dnsmasq /tmp/dnsmasq ro,relatime - squashfs /dev/mtdblock3 ro
62 22 31:5 /surrogate /usr/sbin/dnsmasq rw - jffs2 /dev/mtdblock5 rw
63 40 0:19 / /tmp/with\\040space rw - tmpfs tmpfs rw
";

    #[test]
    fn test_mountinfo_contains() {
        assert!(mountinfo_contains(MOUNTINFO, Path::new("/tmp/dnsmasq")));
        assert!(mountinfo_contains(MOUNTINFO, Path::new("/usr/sbin/dnsmasq")));
        assert!(!mountinfo_contains(MOUNTINFO, Path::new("/usr/sbin")));
        assert!(!mountinfo_contains("", Path::new("/tmp/dnsmasq")));
    }

    #[test]
    fn test_mountinfo_escaped_spaces() {
        assert!(mountinfo_contains(MOUNTINFO, Path::new("/tmp/with space")));
        assert!(!mountinfo_contains(MOUNTINFO, Path::new("/tmp/with\\040space")));
    }

    #[test]
    fn test_c_path_rejects_nul() {
        assert!(c_path(Path::new("/tmp/ok")).is_ok());
        let err = c_path(Path::new("/tmp/bad\0path")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
