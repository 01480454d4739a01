//! JSON introspection documents: per-module control descriptors and the
//! program-wide module listing.

use serde::Serialize;
use serde_json::Map;

use crate::context::StreamerContext;
use crate::control::{ControlDescriptor, ControlKind};

/// Serialized view of one control descriptor.
#[derive(Serialize)]
struct ControlJson<'a> {
    name: &'a str,
    id: u32,
    #[serde(rename = "type")]
    kind: ControlKind,
    min: i64,
    max: i64,
    step: i64,
    default: i64,
    value: i64,
    /// Destination wire value a command for this control must use.
    dest: i64,
    dynamic: bool,
    group: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    menu: Option<Map<String, serde_json::Value>>,
}

#[derive(Serialize)]
struct ControlsDoc<'a> {
    controls: Vec<ControlJson<'a>>,
}

#[derive(Serialize)]
struct ModuleJson<'a> {
    name: &'a str,
    args: &'a str,
}

#[derive(Serialize)]
struct ProgramDoc<'a> {
    inputs: Vec<ModuleJson<'a>>,
    outputs: Vec<ModuleJson<'a>>,
}

fn control_json(desc: &ControlDescriptor, dest: i64) -> ControlJson<'_> {
    let menu = (desc.kind == ControlKind::Menu).then(|| {
        desc.menu
            .iter()
            .map(|(index, label)| (index.to_string(), serde_json::Value::from(label.as_str())))
            .collect()
    });
    ControlJson {
        name: &desc.name,
        id: desc.id,
        kind: desc.kind,
        min: desc.min,
        max: desc.max,
        step: desc.step,
        default: desc.default,
        value: desc.value,
        dest,
        dynamic: desc.dynamic,
        group: desc.group.wire_value(),
        menu,
    }
}

fn controls_doc(controls: &[ControlDescriptor], dest: i64) -> serde_json::Result<Vec<u8>> {
    let doc = ControlsDoc {
        controls: controls.iter().map(|c| control_json(c, dest)).collect(),
    };
    serde_json::to_vec_pretty(&doc)
}

/// `GET /input<N>.json` body. The caller has already bounds-checked `index`.
pub fn input_descriptor(ctx: &StreamerContext, index: usize) -> serde_json::Result<Vec<u8>> {
    match ctx.input(index) {
        Some(slot) => {
            let module = slot.lock_module();
            controls_doc(module.controls().enumerate(), crate::command::DEST_INPUT)
        }
        None => controls_doc(&[], crate::command::DEST_INPUT),
    }
}

/// `GET /output<N>.json` body.
pub fn output_descriptor(ctx: &StreamerContext, index: usize) -> serde_json::Result<Vec<u8>> {
    match ctx.output(index) {
        Some(slot) => {
            let module = slot.lock_module();
            controls_doc(module.controls().enumerate(), crate::command::DEST_OUTPUT)
        }
        None => controls_doc(&[], crate::command::DEST_OUTPUT),
    }
}

/// `GET /program.json` body: every registered module's name and invocation
/// arguments.
pub fn program_descriptor(ctx: &StreamerContext) -> serde_json::Result<Vec<u8>> {
    let doc = ProgramDoc {
        inputs: ctx
            .inputs()
            .iter()
            .map(|slot| ModuleJson { name: &slot.params.name, args: &slot.params.raw })
            .collect(),
        outputs: ctx
            .outputs()
            .iter()
            .map(|slot| ModuleJson { name: &slot.params.name, args: &slot.params.raw })
            .collect(),
    };
    serde_json::to_vec_pretty(&doc)
}
