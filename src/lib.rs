//! picstatus - system status snapshots with a preloaded background image
//!
//! This library provides a collector framework that unifies several polling
//! strategies behind one interface, and a background image preloader that
//! keeps a disk-cached queue of images ready for the next snapshot.
pub mod app;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod core;
pub mod internal_metrics;
pub mod preloader;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod task_manager;

// Re-export core types for convenience
pub use core::*;
