//! Purpose: Read-only decoder for Windows Installer (MSI) package databases.
//! Exports: `api` (stable surface), `core` (format internals), `testing` (fixtures).
//! Role: Library backing the `msiprobe` binary and packaging tooling that needs
//! product metadata without invoking Windows Installer.
//! Invariants: Decoding is in-memory and synchronous; nothing is ever written back.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
#[doc(hidden)]
pub mod testing;
