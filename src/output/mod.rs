//! Frame-consuming output modules.
//!
//! Sinks implement [`crate::module::OutputModule`] and pull frames from an
//! input source's channel through the shared context. The HTTP streaming
//! server is the primary consumer but is wired directly by the daemon; the
//! modules here cover the remaining sink duties.

pub mod file;

pub use file::FileOutput;
