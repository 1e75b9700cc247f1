//! Shared definitions for Parley components.
//!
//! The wire protocol between clients and the server is newline-terminated
//! text lines with `|`-separated fields. Both sides must agree on command
//! names, reply tags, push tags and the string form of the domain enums;
//! all of that lives in [`protocol`] so it is defined exactly once.
//!
//! [`secret`] wraps the `secrecy` crate for credential handling.

pub mod protocol;
pub mod secret;
