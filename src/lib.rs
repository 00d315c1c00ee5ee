#![allow(clippy::len_without_is_empty, clippy::needless_return)]

//! Streaming base64 with an integrity header.
//!
//! The framed form prefixes the line-wrapped body with the original file's
//! name, size and SHA-256 digest; the legacy form is the wrapped body alone.

/// Use mimalloc as the global allocator for all binaries.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod base64;
pub mod checksum;
pub mod common;
pub mod error;
pub mod frame;
pub mod wrap;

pub use error::{Error, HeaderField, Result};
