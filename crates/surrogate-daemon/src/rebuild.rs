//! Config rebuild
//!
//! Merges the persisted dnsmasq config, the operator's client list and the
//! supplementary hosts directory into the config the daemon will read.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use surrogate_core::{
    is_referenceable, parse_client_list, DnsMasqConfig, Layout, Result, SurrogateError,
};

use crate::nvram::ClientListSource;

/// Regular files directly inside `dir`, sorted by path.
///
/// Symlinks to regular files count. A missing directory yields nothing.
/// Names that could not be written as a single config line (non-UTF-8 or
/// containing a line break) are skipped.
pub fn discover_hosts_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Hosts directory {:?} does not exist", dir);
            return Vec::new();
        }
        Err(e) => {
            warn!("Could not list hosts directory {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| match fs::metadata(path) {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                debug!("Skipping {:?}: {}", path, e);
                false
            }
        })
        .filter(|path| {
            let usable = is_referenceable(path);
            if !usable {
                warn!("Skipping hosts file with unusable name {:?}", path);
            }
            usable
        })
        .collect();

    // read_dir order depends on the filesystem
    files.sort();
    files
}

/// Build the full config in memory without touching the config file.
///
/// Unreadable inputs degrade to empty ones: a missing config starts from
/// scratch, an unreadable client list contributes no hosts.
pub fn build_config(layout: &Layout, source: &dyn ClientListSource) -> DnsMasqConfig {
    let mut config = match File::open(&layout.config_path) {
        Ok(file) => DnsMasqConfig::read_from(file).unwrap_or_else(|e| {
            warn!("Could not read {:?}: {}, starting empty", layout.config_path, e);
            DnsMasqConfig::new()
        }),
        Err(e) => {
            if e.kind() == io::ErrorKind::NotFound {
                debug!("No config at {:?}, starting empty", layout.config_path);
            } else {
                warn!("Could not open {:?}: {}, starting empty", layout.config_path, e);
            }
            DnsMasqConfig::new()
        }
    };

    let raw = source.get(&layout.client_list_key).unwrap_or_else(|e| {
        warn!("Could not read client list: {}", e);
        String::new()
    });
    let records = parse_client_list(&raw);
    debug!("Client list yields {} host records", records.len());
    config.rewrite_hosts(&records);

    for path in discover_hosts_files(&layout.hosts_dir) {
        debug!("Adding hosts file {:?}", path);
        config.add_hosts_file(path);
    }

    config
}

/// Write `config` to the canonical config path.
pub fn save_config(layout: &Layout, config: &DnsMasqConfig) -> Result<()> {
    let path = &layout.config_path;
    let file = File::create(path)
        .map_err(|e| SurrogateError::io(format!("create {:?}", path), e))?;
    config
        .save(BufWriter::new(file))
        .map_err(|e| SurrogateError::io(format!("write {:?}", path), e))?;

    info!(
        "Saved {:?} with {} host records",
        path,
        config.managed().hosts().len()
    );
    Ok(())
}

/// Rebuild and save the config. Run this right before starting the daemon.
pub fn rebuild_config(layout: &Layout, source: &dyn ClientListSource) -> Result<DnsMasqConfig> {
    let config = build_config(layout, source);
    save_config(layout, &config)?;
    Ok(config)
}
