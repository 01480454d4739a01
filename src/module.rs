//! Module contract: the narrow interface between the relay core and the
//! capture/consumer code it hosts.
//!
//! Modules are selected at startup by name through a registration-time
//! factory map rather than loaded from shared objects. A module spec string
//! keeps the flavor of the original plugin argument lists:
//! `name[:key=value[,key=value...]]`, e.g. `test_picture:fps=5` or
//! `file:folder=/var/frames,delay=200`.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::channel::FrameChannel;
use crate::context::StreamerContext;
use crate::control::ControlRegistry;

/// A frame producer. One producer thread per started module writes into the
/// module's [`FrameChannel`].
pub trait InputModule: Send {
    fn name(&self) -> &str;

    fn controls(&self) -> &ControlRegistry;
    fn controls_mut(&mut self) -> &mut ControlRegistry;

    /// Begin producing frames into `channel`. The module owns its thread(s)
    /// and must exit its capture loop once `stop` is set.
    fn start(&mut self, channel: Arc<FrameChannel>, stop: Arc<AtomicBool>) -> Result<()>;

    /// Unwind the module's thread(s). The stop flag is already set when this
    /// is called.
    fn stop(&mut self);

    /// Apply a validated command. The router has already bounds-checked the
    /// value against the control registry; the default handler just stores
    /// it. Modules with side effects (fps change, take snapshot) override
    /// this and still keep the registry in sync.
    fn command(&mut self, control_id: u32, group: u32, value: i64, value_string: Option<&str>) -> i32 {
        let _ = (group, value_string);
        match self.controls_mut().set(control_id, value) {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }
}

/// A frame consumer. Sinks read from input channels through the shared
/// context; they never touch a channel's buffer directly.
pub trait OutputModule: Send {
    fn name(&self) -> &str;

    fn controls(&self) -> &ControlRegistry;
    fn controls_mut(&mut self) -> &mut ControlRegistry;

    fn start(&mut self, ctx: Arc<StreamerContext>) -> Result<()>;

    fn stop(&mut self);

    fn command(&mut self, control_id: u32, group: u32, value: i64, value_string: Option<&str>) -> i32 {
        let _ = (group, value_string);
        match self.controls_mut().set(control_id, value) {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }
}

// ----------------------------------------------------------------------------
// Module spec strings and factories
// ----------------------------------------------------------------------------

/// Parsed module spec: the module name plus its key/value parameters.
#[derive(Clone, Debug)]
pub struct ModuleParams {
    pub name: String,
    /// The raw spec string, reported verbatim in `program.json`.
    pub raw: String,
    params: HashMap<String, String>,
}

impl ModuleParams {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(anyhow!("empty module spec"));
        }
        let (name, args) = match spec.split_once(':') {
            Some((name, args)) => (name, args),
            None => (spec, ""),
        };
        let mut params = HashMap::new();
        for pair in args.split(',').filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("module parameter '{}' is not key=value", pair))?;
            params.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self {
            name: name.trim().to_string(),
            raw: spec.to_string(),
            params,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parse an integral parameter, falling back to `default` when absent.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.params.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow!("module parameter '{}={}' is not valid", key, raw)),
            None => Ok(default),
        }
    }
}

pub type InputFactory = fn(&ModuleParams) -> Result<Box<dyn InputModule>>;
pub type OutputFactory = fn(&ModuleParams) -> Result<Box<dyn OutputModule>>;

/// Name -> constructor map for input modules compiled into this build.
pub fn input_factories() -> HashMap<&'static str, InputFactory> {
    let mut map: HashMap<&'static str, InputFactory> = HashMap::new();
    map.insert("test_picture", |p| {
        Ok(Box::new(crate::input::test_picture::TestPictureInput::new(p)?))
    });
    map.insert("file", |p| Ok(Box::new(crate::input::file::FileInput::new(p)?)));
    map
}

/// Name -> constructor map for output modules compiled into this build.
pub fn output_factories() -> HashMap<&'static str, OutputFactory> {
    let mut map: HashMap<&'static str, OutputFactory> = HashMap::new();
    map.insert("file", |p| Ok(Box::new(crate::output::file::FileOutput::new(p)?)));
    map
}

/// Build an input module from a spec string.
pub fn build_input(spec: &str) -> Result<(ModuleParams, Box<dyn InputModule>)> {
    let params = ModuleParams::parse(spec)?;
    let factory = input_factories()
        .get(params.name.as_str())
        .copied()
        .ok_or_else(|| anyhow!("unknown input module '{}'", params.name))?;
    let module = factory(&params)?;
    Ok((params, module))
}

/// Build an output module from a spec string.
pub fn build_output(spec: &str) -> Result<(ModuleParams, Box<dyn OutputModule>)> {
    let params = ModuleParams::parse(spec)?;
    let factory = output_factories()
        .get(params.name.as_str())
        .copied()
        .ok_or_else(|| anyhow!("unknown output module '{}'", params.name))?;
    let module = factory(&params)?;
    Ok((params, module))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name() {
        let p = ModuleParams::parse("test_picture").unwrap();
        assert_eq!(p.name, "test_picture");
        assert_eq!(p.get("fps"), None);
    }

    #[test]
    fn parses_key_value_list() {
        let p = ModuleParams::parse("file:folder=/tmp/frames,delay=200").unwrap();
        assert_eq!(p.name, "file");
        assert_eq!(p.get("folder"), Some("/tmp/frames"));
        assert_eq!(p.get_parsed("delay", 0u64).unwrap(), 200);
        assert_eq!(p.raw, "file:folder=/tmp/frames,delay=200");
    }

    #[test]
    fn rejects_malformed_parameters() {
        assert!(ModuleParams::parse("").is_err());
        assert!(ModuleParams::parse("file:folder").is_err());

        let p = ModuleParams::parse("test_picture:fps=abc").unwrap();
        assert!(p.get_parsed("fps", 10u32).is_err());
    }

    #[test]
    fn unknown_module_name_is_an_error() {
        assert!(build_input("v4l2:device=/dev/video0").is_err());
        assert!(build_output("mqtt").is_err());
    }
}
