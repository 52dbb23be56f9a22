//! Launch trampoline
//!
//! The same binary runs in two modes, chosen only by the name it was
//! invoked under:
//!
//! - as `dnsmasq` (through the bind mount, started by rc) it rebuilds the
//!   config and execs the real daemon with the original arguments;
//! - under any other name it is the admin tool (`install`, `remove`,
//!   `showconfig`, `version`).
//!
//! In launch mode the arguments belong to dnsmasq and are never parsed,
//! even if one of them happens to be `install`.

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::Path;

use tracing::{error, info, warn};

use surrogate_core::{Layout, SurrogateError};

use crate::exec::ProcessImage;
use crate::nvram::ClientListSource;
use crate::rebuild::{build_config, rebuild_config};

/// How the process was invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Started in place of the daemon; `args` excludes argv[0]
    Launch { arg0: OsString, args: Vec<OsString> },
    /// Admin tool; the full argument vector, argv[0] included
    Admin(Vec<OsString>),
}

/// Pick the mode from argv[0], resolved against `cwd`.
pub fn detect_mode(argv: Vec<OsString>, cwd: &Path, reserved_name: &str) -> Mode {
    let is_reserved = match argv.first() {
        Some(arg0) if !arg0.is_empty() => {
            cwd.join(arg0).file_name() == Some(OsStr::new(reserved_name))
        }
        _ => false,
    };

    if !is_reserved {
        return Mode::Admin(argv);
    }

    let mut argv = argv.into_iter();
    let arg0 = argv.next().unwrap_or_default();
    Mode::Launch {
        arg0,
        args: argv.collect(),
    }
}

/// Rebuilds the config and hands over to the real daemon
pub struct Trampoline<'a> {
    layout: &'a Layout,
    source: &'a dyn ClientListSource,
    image: &'a dyn ProcessImage,
}

impl<'a> Trampoline<'a> {
    pub fn new(
        layout: &'a Layout,
        source: &'a dyn ClientListSource,
        image: &'a dyn ProcessImage,
    ) -> Self {
        Self {
            layout,
            source,
            image,
        }
    }

    /// Rebuild the config, then exec the real daemon.
    ///
    /// A config that cannot be saved does not stop the launch; the daemon
    /// then reads whatever config is on disk. Only returns on exec failure.
    pub fn launch(&self, arg0: &OsStr, args: &[OsString]) -> SurrogateError {
        match rebuild_config(self.layout, self.source) {
            Ok(config) => info!(
                "Rebuilt dnsmasq config: {} hosts, {} hosts files",
                config.managed().hosts().len(),
                config.managed().hosts_files().count()
            ),
            Err(e) => {
                error!("Could not save dnsmasq config: {}", e);
                warn!("Starting dnsmasq with the config already on disk");
            }
        }

        let program = &self.layout.alias_path;
        info!("Starting {:?} with {} arguments", program, args.len());
        let source = self.image.replace(program, arg0, args);
        SurrogateError::Exec {
            program: program.clone(),
            source,
        }
    }

    /// Build the config in memory and print it, without saving.
    pub fn show_config<W: Write>(&self, out: W) -> std::io::Result<()> {
        build_config(self.layout, self.source).save(out)
    }
}
