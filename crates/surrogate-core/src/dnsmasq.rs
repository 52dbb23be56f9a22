//! dnsmasq configuration model
//!
//! A config file is kept as the ordered list of its lines plus one
//! tool-owned region, the managed hosts block:
//!
//! ```text
//! domain-needed
//! # BEGIN dnsmasq-surrogate managed hosts
//! host-record=alpha,192.168.1.10
//! addn-hosts=/jffs/dnsmasq-surrogate/hosts/lab.hosts
//! # END dnsmasq-surrogate managed hosts
//! ```
//!
//! Lines outside the block are never interpreted beyond `key[=value]`
//! splitting and are written back byte-for-byte. The block is regenerated
//! on every launch and always saved after the other lines.

use std::collections::{BTreeSet, HashMap};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::client_list::HostRecord;

/// First line of the managed block
pub const BEGIN_MARKER: &str = "# BEGIN dnsmasq-surrogate managed hosts";

/// Last line of the managed block
pub const END_MARKER: &str = "# END dnsmasq-surrogate managed hosts";

const HOST_RECORD_KEY: &str = "host-record";
const ADDN_HOSTS_KEY: &str = "addn-hosts";

/// One line of the config file, kept with its exact original bytes
///
/// Key and value are decoded leniently for matching only; the raw bytes
/// are what gets written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Blank(Vec<u8>),
    Comment(Vec<u8>),
    Option {
        key: String,
        value: Option<String>,
        raw: Vec<u8>,
    },
}

impl Directive {
    /// Classify a single line (without its `\n`).
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Directive::Blank(raw.to_vec());
        }
        if trimmed.starts_with('#') {
            return Directive::Comment(raw.to_vec());
        }

        let (key, value) = match trimmed.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim().to_string())),
            None => (trimmed, None),
        };
        Directive::Option {
            key: key.to_string(),
            value,
            raw: raw.to_vec(),
        }
    }

    /// The line exactly as read
    pub fn raw(&self) -> &[u8] {
        match self {
            Directive::Blank(raw) | Directive::Comment(raw) => raw,
            Directive::Option { raw, .. } => raw,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Directive::Option { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Directive::Option { value, .. } => value.as_deref(),
            _ => None,
        }
    }
}

/// Content of the managed block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedHosts {
    hosts: Vec<HostRecord>,
    hosts_files: BTreeSet<PathBuf>,
    /// Set once the block was read from text or written to; an untouched
    /// empty block is not emitted.
    materialized: bool,
}

impl ManagedHosts {
    pub fn hosts(&self) -> &[HostRecord] {
        &self.hosts
    }

    /// Referenced hosts files, in sorted order
    pub fn hosts_files(&self) -> impl Iterator<Item = &Path> {
        self.hosts_files.iter().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.hosts_files.is_empty()
    }

    fn absorb(&mut self, directive: Directive) {
        match (directive.key(), directive.value()) {
            (Some(HOST_RECORD_KEY), Some(value)) => match parse_host_record(value) {
                Some(record) => self.hosts.push(record),
                None => debug!(
                    "Discarding unreadable managed line {:?}",
                    String::from_utf8_lossy(directive.raw())
                ),
            },
            (Some(ADDN_HOSTS_KEY), Some(value)) if !value.is_empty() => {
                self.hosts_files.insert(PathBuf::from(value));
            }
            _ => debug!(
                "Discarding foreign line in managed block {:?}",
                String::from_utf8_lossy(directive.raw())
            ),
        }
    }

    fn render(&self, out: &mut Vec<u8>) {
        let mut block = format!("{}\n", BEGIN_MARKER);
        for record in &self.hosts {
            block.push_str(&format!(
                "{}={},{}\n",
                HOST_RECORD_KEY, record.hostname, record.address
            ));
        }
        for path in &self.hosts_files {
            block.push_str(&format!("{}={}\n", ADDN_HOSTS_KEY, path.display()));
        }
        block.push_str(END_MARKER);
        block.push('\n');
        out.extend_from_slice(block.as_bytes());
    }
}

fn parse_host_record(value: &str) -> Option<HostRecord> {
    let (hostname, address) = value.split_once(',')?;
    let hostname = hostname.trim();
    if hostname.is_empty() {
        return None;
    }
    Some(HostRecord::new(hostname, address.trim().parse().ok()?))
}

/// A path that can be written as one `addn-hosts=` line and read back
/// unchanged: valid UTF-8 with no line breaks.
pub fn is_referenceable(path: &Path) -> bool {
    match path.to_str() {
        Some(text) => !text.is_empty() && !text.contains(|c: char| c == '\n' || c == '\r'),
        None => false,
    }
}

/// In-memory dnsmasq config: load, mutate the managed block, save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsMasqConfig {
    directives: Vec<Directive>,
    trailing_newline: bool,
    managed: ManagedHosts,
}

impl DnsMasqConfig {
    /// Empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config text. Never fails: unknown lines are kept verbatim.
    pub fn load(text: &str) -> Self {
        Self::load_bytes(text.as_bytes())
    }

    /// Parse config bytes. Lines outside the managed block are kept
    /// byte-for-byte, whatever their encoding.
    ///
    /// A begin marker without a matching end marker makes the rest of the
    /// text part of the managed block.
    pub fn load_bytes(bytes: &[u8]) -> Self {
        let mut config = Self::new();
        if bytes.is_empty() {
            return config;
        }

        let body = match bytes.strip_suffix(b"\n") {
            Some(body) => {
                config.trailing_newline = true;
                body
            }
            None => bytes,
        };

        let mut in_block = false;
        for line in body.split(|&b| b == b'\n') {
            let text = String::from_utf8_lossy(line);
            let marker = text.trim_end();
            if marker == BEGIN_MARKER {
                if in_block {
                    warn!("Nested managed block marker; merging into the open block");
                }
                in_block = true;
                config.managed.materialized = true;
                continue;
            }
            if marker == END_MARKER && in_block {
                in_block = false;
                continue;
            }

            let directive = Directive::parse(line);
            if in_block {
                config.managed.absorb(directive);
            } else {
                config.directives.push(directive);
            }
        }

        if in_block {
            warn!("Managed block is missing its end marker");
        }
        config
    }

    /// Read and parse a config from `reader`.
    pub fn read_from<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::load_bytes(&bytes))
    }

    /// Replace the managed block with one host record per unique hostname.
    ///
    /// The last record for a hostname wins and takes the slot of its first
    /// appearance. Hostnames compare case-insensitively. Hosts file
    /// references are cleared too; discovery re-adds the current set.
    pub fn rewrite_hosts<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a HostRecord>,
    {
        let mut hosts: Vec<HostRecord> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        for record in records {
            if record.hostname.trim().is_empty() {
                continue;
            }
            match slots.get(&record.hostname.to_ascii_lowercase()) {
                Some(&slot) => {
                    debug!(
                        "Hostname {} listed again; {} replaces {}",
                        record.hostname, record.address, hosts[slot].address
                    );
                    hosts[slot] = record.clone();
                }
                None => {
                    slots.insert(record.hostname.to_ascii_lowercase(), hosts.len());
                    hosts.push(record.clone());
                }
            }
        }

        self.managed.hosts = hosts;
        self.managed.hosts_files.clear();
        self.managed.materialized = true;
    }

    /// Reference a supplementary hosts file from the managed block.
    ///
    /// Returns false if the path was already referenced or cannot be
    /// written as a single directive (see [`is_referenceable`]). References
    /// are emitted in sorted order whatever order they are added in.
    pub fn add_hosts_file(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if !is_referenceable(&path) {
            warn!("Not referencing hosts file {:?}: unusable path", path);
            return false;
        }
        self.managed.materialized = true;
        self.managed.hosts_files.insert(path)
    }

    /// The full file content: other lines verbatim, then the managed block.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, directive) in self.directives.iter().enumerate() {
            if i > 0 {
                out.push(b'\n');
            }
            out.extend_from_slice(directive.raw());
        }

        let has_lines = !self.directives.is_empty();
        if has_lines && self.trailing_newline {
            out.push(b'\n');
        }

        if self.managed.materialized || !self.managed.is_empty() {
            if has_lines && !self.trailing_newline {
                out.push(b'\n');
            }
            self.managed.render(&mut out);
        }
        out
    }

    /// Write the config, same bytes as [`to_bytes`](Self::to_bytes).
    pub fn save<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }

    /// Lines outside the managed block, in original order
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn managed(&self) -> &ManagedHosts {
        &self.managed
    }
}
