// Library root: exposes the watcher's config and event loop so integration
// tests can drive them without the binary.

pub mod app;
pub mod config;
