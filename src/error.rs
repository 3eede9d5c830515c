//! Error related data structures.
//!
//! The core uses a single [`Error`] type for every fallible public entry
//! point (cartridge load, save load/store). It is defined in the shared
//! support crate so a future frontend crate can match on it without
//! depending on the full core.

pub use pocketcore_common::error::{Error, ErrorKind};
