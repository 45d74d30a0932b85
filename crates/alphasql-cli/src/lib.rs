//! AlphaSQL CLI library.
//!
//! This module exposes internal types for testing purposes. The three
//! entry points are the `alphadag`, `alphacheck`, and `alphabeam` binaries.

pub mod beam;
pub mod check;
pub mod dag;
pub mod logging;
