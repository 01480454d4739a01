//! Runtime command plane: validate and dispatch a
//! `{destination, module, control id, group, value}` tuple to the right
//! module's command handler.
//!
//! Validation happens in two stages. The router first rejects malformed
//! destinations and module indices, then asks the target module's control
//! registry to bounds-check the write. Only a command that survives both
//! stages ever crosses into module code, which is what keeps untrusted HTTP
//! input away from module internals.

use thiserror::Error;

use crate::context::StreamerContext;
use crate::control::ControlError;

/// Wire values of the `dest=` command parameter.
pub const DEST_INPUT: i64 = 0;
pub const DEST_OUTPUT: i64 = 1;
pub const DEST_PROGRAM: i64 = 2;

pub const CODE_INVALID_DESTINATION: i32 = -1;
pub const CODE_UNKNOWN_MODULE: i32 = -2;

/// A routed control command. Transient: built per request, never persisted.
#[derive(Clone, Debug)]
pub struct Command {
    /// Destination wire value; validated by the router, not the parser.
    pub dest: i64,
    /// Index into the destination registry.
    pub module: i64,
    pub control_id: i64,
    pub group: i64,
    pub value: i64,
    pub value_string: Option<String>,
}

impl Command {
    /// Command for control `id` on input module 0 with default group.
    pub fn set(control_id: i64, value: i64) -> Self {
        Self {
            dest: DEST_INPUT,
            module: 0,
            control_id,
            group: 0,
            value,
            value_string: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid command destination {0}")]
    InvalidDestination(i64),
    #[error("no module {index} registered for destination {dest}")]
    UnknownModule { dest: i64, index: i64 },
    #[error(transparent)]
    Control(#[from] ControlError),
}

impl CommandError {
    /// Stable numeric code reported in the `"<id>: <code>"` response body.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidDestination(_) => CODE_INVALID_DESTINATION,
            Self::UnknownModule { .. } => CODE_UNKNOWN_MODULE,
            Self::Control(e) => e.code(),
        }
    }
}

pub struct CommandRouter;

impl CommandRouter {
    /// Validate `cmd` and invoke the target module's command handler.
    ///
    /// On success the module's own result code is propagated verbatim. A
    /// failing dispatch never mutates any control registry.
    pub fn dispatch(ctx: &StreamerContext, cmd: &Command) -> Result<i32, CommandError> {
        let index = usize::try_from(cmd.module)
            .map_err(|_| CommandError::UnknownModule { dest: cmd.dest, index: cmd.module })?;
        let group = u32::try_from(cmd.group).unwrap_or(0);
        // A control id outside u32 can match no descriptor.
        let control_id = u32::try_from(cmd.control_id)
            .map_err(|_| ControlError::UnknownControl(u32::MAX))?;

        match cmd.dest {
            DEST_INPUT => {
                let slot = ctx
                    .input(index)
                    .ok_or(CommandError::UnknownModule { dest: cmd.dest, index: cmd.module })?;
                let mut module = slot.lock_module();
                module.controls().check_set(control_id, cmd.value)?;
                Ok(module.command(control_id, group, cmd.value, cmd.value_string.as_deref()))
            }
            DEST_OUTPUT => {
                let slot = ctx
                    .output(index)
                    .ok_or(CommandError::UnknownModule { dest: cmd.dest, index: cmd.module })?;
                let mut module = slot.lock_module();
                module.controls().check_set(control_id, cmd.value)?;
                Ok(module.command(control_id, group, cmd.value, cmd.value_string.as_deref()))
            }
            // Reserved for program self-commands; accepted as a no-op.
            DEST_PROGRAM => Ok(0),
            other => Err(CommandError::InvalidDestination(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil::stub_context;
    use crate::control::{CODE_NOT_DYNAMIC, CODE_OUT_OF_RANGE};

    #[test]
    fn valid_command_reaches_module_and_updates_value() {
        let ctx = stub_context();
        let res = CommandRouter::dispatch(&ctx, &Command::set(5, 42));
        assert_eq!(res, Ok(0));

        let slot = ctx.input(0).unwrap();
        let module = slot.lock_module();
        assert_eq!(module.controls().value(5), Ok(42));
    }

    #[test]
    fn invalid_destination_is_rejected() {
        let ctx = stub_context();
        let cmd = Command { dest: 7, ..Command::set(5, 1) };
        let err = CommandRouter::dispatch(&ctx, &cmd).unwrap_err();
        assert_eq!(err, CommandError::InvalidDestination(7));
        assert_eq!(err.code(), CODE_INVALID_DESTINATION);
    }

    #[test]
    fn module_index_is_bounds_checked() {
        let ctx = stub_context();
        let cmd = Command { module: 3, ..Command::set(5, 1) };
        assert_eq!(
            CommandRouter::dispatch(&ctx, &cmd),
            Err(CommandError::UnknownModule { dest: DEST_INPUT, index: 3 })
        );

        let cmd = Command { dest: DEST_OUTPUT, ..Command::set(5, 1) };
        assert!(matches!(
            CommandRouter::dispatch(&ctx, &cmd),
            Err(CommandError::UnknownModule { .. })
        ));

        let cmd = Command { module: -1, ..Command::set(5, 1) };
        assert!(matches!(
            CommandRouter::dispatch(&ctx, &cmd),
            Err(CommandError::UnknownModule { .. })
        ));
    }

    #[test]
    fn out_of_range_never_reaches_the_module_and_is_idempotent() {
        let ctx = stub_context();
        for _ in 0..2 {
            let err = CommandRouter::dispatch(&ctx, &Command::set(5, 999)).unwrap_err();
            assert_eq!(err.code(), CODE_OUT_OF_RANGE);
        }
        let slot = ctx.input(0).unwrap();
        let module = slot.lock_module();
        // Stored value untouched, module handler never invoked.
        assert_eq!(module.controls().value(5), Ok(80));
    }

    #[test]
    fn fixed_control_write_is_refused() {
        let ctx = stub_context();
        let err = CommandRouter::dispatch(&ctx, &Command::set(9, 800)).unwrap_err();
        assert_eq!(err.code(), CODE_NOT_DYNAMIC);
    }

    #[test]
    fn program_destination_is_a_no_op() {
        let ctx = stub_context();
        let cmd = Command { dest: DEST_PROGRAM, ..Command::set(5, 999) };
        assert_eq!(CommandRouter::dispatch(&ctx, &cmd), Ok(0));
    }
}
