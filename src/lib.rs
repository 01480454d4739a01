//! MJPEG relay
//!
//! A small streaming daemon that moves Motion-JPEG frames from input
//! modules (cameras, folders of stills, a synthetic test picture) to
//! output sinks, the main one being a hand-written HTTP/1.0 server that
//! serves single snapshots and endless `multipart/x-mixed-replace`
//! streams.
//!
//! # Module Structure
//!
//! - `channel`: single-writer / multi-reader latest-frame hand-off
//! - `control`: per-module runtime control descriptors and registry
//! - `command`: request routing from the HTTP surface to modules
//! - `module`: input/output module traits and the spec-string factory
//! - `context`: the owned registry of running inputs and outputs
//! - `http`: the HTTP/1.0 server (snapshot, stream, commands, files)
//! - `input`, `output`: the built-in modules
//! - `config`: daemon configuration file and environment overrides

pub mod channel;
pub mod command;
pub mod config;
pub mod context;
pub mod control;
pub mod http;
pub mod input;
pub mod module;
pub mod output;

pub use channel::{FrameChannel, FrameReader, FrameTimestamp};
pub use command::{Command, CommandError, CommandRouter};
pub use config::RelaydConfig;
pub use context::{ContextBuilder, StreamerContext};
pub use control::{ControlDescriptor, ControlError, ControlGroup, ControlKind, ControlRegistry};
pub use http::{HttpConfig, HttpHandle, HttpServer};
pub use module::{InputModule, ModuleParams, OutputModule};
