//! Scheduled task management for iptv-tuner.
//!
//! This module provides:
//! - [`RefreshScheduler`]: Periodic playlist refresh

pub mod refresh_scheduler;

pub use refresh_scheduler::RefreshScheduler;
