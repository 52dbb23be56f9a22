//! Surrogate Core - client list decoding and the dnsmasq config model
//!
//! This crate holds the parts of dnsmasq-surrogate that only transform text.
//! It has no dependencies on mounts, services or process control.

pub mod client_list;
pub mod dnsmasq;
pub mod error;
pub mod layout;

pub use client_list::{parse_client_list, parse_entries, ClientListEntry, HostRecord};
pub use dnsmasq::{
    is_referenceable, Directive, DnsMasqConfig, ManagedHosts, BEGIN_MARKER, END_MARKER,
};
pub use error::*;
pub use layout::Layout;
