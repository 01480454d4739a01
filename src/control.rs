//! Per-module table of controllable parameters.
//!
//! Every module exposes a [`ControlRegistry`]: an ordered set of
//! [`ControlDescriptor`] entries with bounds, a mutability flag and the
//! current value. The registry only validates and stores values; applying a
//! value to hardware or a producer thread is the module command handler's
//! job.

use serde::Serialize;
use thiserror::Error;

/// Numeric result codes carried in the plain-text command response body.
pub const CODE_UNKNOWN_CONTROL: i32 = -3;
pub const CODE_OUT_OF_RANGE: i32 = -4;
pub const CODE_NOT_DYNAMIC: i32 = -5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("no control with id {0}")]
    UnknownControl(u32),
    #[error("value {value} out of range [{min}, {max}] for control {id}")]
    OutOfRange { id: u32, value: i64, min: i64, max: i64 },
    #[error("control {0} cannot be changed at runtime")]
    NotDynamic(u32),
}

impl ControlError {
    pub fn code(&self) -> i32 {
        match self {
            Self::UnknownControl(_) => CODE_UNKNOWN_CONTROL,
            Self::OutOfRange { .. } => CODE_OUT_OF_RANGE,
            Self::NotDynamic(_) => CODE_NOT_DYNAMIC,
        }
    }
}

/// Control value shape. Menu controls carry an ordered item list in their
/// descriptor; the stored value is the selected item index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Bool,
    Integer,
    Menu,
    String,
    Button,
}

/// Control group tag. Wire values match the `group=` command parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlGroup {
    #[default]
    Generic,
    Device,
    Resolution,
    JpegQuality,
}

impl ControlGroup {
    pub fn wire_value(self) -> u32 {
        match self {
            Self::Generic => 0,
            Self::Device => 1,
            Self::Resolution => 2,
            Self::JpegQuality => 3,
        }
    }
}

/// One controllable parameter: identity, bounds, current value, mutability.
#[derive(Clone, Debug)]
pub struct ControlDescriptor {
    pub id: u32,
    pub name: String,
    pub kind: ControlKind,
    pub min: i64,
    pub max: i64,
    pub step: i64,
    pub default: i64,
    pub value: i64,
    /// Whether the value may be changed while the producer is running.
    pub dynamic: bool,
    pub group: ControlGroup,
    /// `(index, label)` items, meaningful only for [`ControlKind::Menu`].
    pub menu: Vec<(i64, String)>,
}

impl ControlDescriptor {
    /// Integer control spanning `min..=max`, starting at its default.
    pub fn integer(id: u32, name: &str, min: i64, max: i64, default: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind: ControlKind::Integer,
            min,
            max,
            step: 1,
            default,
            value: default,
            dynamic: true,
            group: ControlGroup::Generic,
            menu: Vec::new(),
        }
    }

    pub fn boolean(id: u32, name: &str, default: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind: ControlKind::Bool,
            min: 0,
            max: 1,
            step: 1,
            default: i64::from(default),
            value: i64::from(default),
            dynamic: true,
            group: ControlGroup::Generic,
            menu: Vec::new(),
        }
    }

    pub fn button(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind: ControlKind::Button,
            min: 0,
            max: 0,
            step: 0,
            default: 0,
            value: 0,
            dynamic: true,
            group: ControlGroup::Generic,
            menu: Vec::new(),
        }
    }

    pub fn menu(id: u32, name: &str, items: Vec<(i64, String)>, default: i64) -> Self {
        let min = items.iter().map(|(i, _)| *i).min().unwrap_or(0);
        let max = items.iter().map(|(i, _)| *i).max().unwrap_or(0);
        Self {
            id,
            name: name.to_string(),
            kind: ControlKind::Menu,
            min,
            max,
            step: 1,
            default,
            value: default,
            dynamic: true,
            group: ControlGroup::Generic,
            menu: items,
        }
    }

    pub fn fixed(mut self) -> Self {
        self.dynamic = false;
        self
    }

    pub fn in_group(mut self, group: ControlGroup) -> Self {
        self.group = group;
        self
    }
}

/// Ordered control table, kept sorted by id so enumeration is stable.
#[derive(Default)]
pub struct ControlRegistry {
    controls: Vec<ControlDescriptor>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any existing one with the same id.
    pub fn register(&mut self, desc: ControlDescriptor) {
        match self.controls.binary_search_by_key(&desc.id, |c| c.id) {
            Ok(pos) => self.controls[pos] = desc,
            Err(pos) => self.controls.insert(pos, desc),
        }
    }

    /// All descriptors in ascending id order.
    pub fn enumerate(&self) -> &[ControlDescriptor] {
        &self.controls
    }

    pub fn get(&self, id: u32) -> Result<&ControlDescriptor, ControlError> {
        self.controls
            .iter()
            .find(|c| c.id == id)
            .ok_or(ControlError::UnknownControl(id))
    }

    /// Validate a prospective write without mutating anything. This is what
    /// the command router calls before crossing into module code.
    pub fn check_set(&self, id: u32, value: i64) -> Result<(), ControlError> {
        let desc = self.get(id)?;
        if !desc.dynamic {
            return Err(ControlError::NotDynamic(id));
        }
        // Buttons carry no value; every other kind is range-checked.
        if desc.kind != ControlKind::Button && (value < desc.min || value > desc.max) {
            return Err(ControlError::OutOfRange {
                id,
                value,
                min: desc.min,
                max: desc.max,
            });
        }
        Ok(())
    }

    /// Validate and store a new current value.
    pub fn set(&mut self, id: u32, value: i64) -> Result<(), ControlError> {
        self.check_set(id, value)?;
        if let Some(desc) = self.controls.iter_mut().find(|c| c.id == id) {
            if desc.kind != ControlKind::Button {
                desc.value = value;
            }
        }
        Ok(())
    }

    pub fn value(&self, id: u32) -> Result<i64, ControlError> {
        self.get(id).map(|c| c.value)
    }

    pub fn menu_items(&self, id: u32) -> Result<&[(i64, String)], ControlError> {
        self.get(id).map(|c| c.menu.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ControlRegistry {
        let mut reg = ControlRegistry::new();
        reg.register(ControlDescriptor::integer(5, "quality", 0, 100, 80));
        reg.register(ControlDescriptor::integer(1, "fps", 1, 60, 10));
        reg.register(ControlDescriptor::integer(3, "delay", 0, 10_000, 0).fixed());
        reg.register(ControlDescriptor::menu(
            7,
            "mode",
            vec![(0, "auto".to_string()), (1, "manual".to_string())],
            0,
        ));
        reg
    }

    #[test]
    fn enumeration_is_sorted_by_id() {
        let reg = registry();
        let ids: Vec<u32> = reg.enumerate().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3, 5, 7]);
    }

    #[test]
    fn set_enforces_bounds() {
        let mut reg = registry();
        assert_eq!(reg.set(5, 100), Ok(()));
        assert_eq!(reg.value(5), Ok(100));

        let err = reg.set(5, 101).unwrap_err();
        assert_eq!(
            err,
            ControlError::OutOfRange { id: 5, value: 101, min: 0, max: 100 }
        );
        // Failed write leaves the stored value untouched.
        assert_eq!(reg.value(5), Ok(100));

        assert!(matches!(reg.set(5, -1), Err(ControlError::OutOfRange { .. })));
    }

    #[test]
    fn set_rejects_fixed_controls() {
        let mut reg = registry();
        assert_eq!(reg.set(3, 500), Err(ControlError::NotDynamic(3)));
        assert_eq!(reg.value(3), Ok(0));
    }

    #[test]
    fn unknown_control_is_reported() {
        let mut reg = registry();
        assert_eq!(reg.set(99, 0), Err(ControlError::UnknownControl(99)));
        assert_eq!(reg.value(99), Err(ControlError::UnknownControl(99)));
    }

    #[test]
    fn register_replaces_same_id() {
        let mut reg = registry();
        reg.register(ControlDescriptor::integer(5, "quality", 0, 50, 25));
        assert_eq!(reg.get(5).unwrap().max, 50);
        assert_eq!(reg.enumerate().len(), 4);
    }

    #[test]
    fn menu_items_exposed() {
        let reg = registry();
        let items = reg.menu_items(7).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], (1, "manual".to_string()));
        assert!(reg.menu_items(2).is_err());
    }

    #[test]
    fn button_ignores_value_range() {
        let mut reg = ControlRegistry::new();
        reg.register(ControlDescriptor::button(9, "take"));
        assert_eq!(reg.set(9, 1234), Ok(()));
        assert_eq!(reg.value(9), Ok(0));
    }
}
