//! Built-in interceptors and post-execution hooks.

pub mod event;
pub mod logging;
