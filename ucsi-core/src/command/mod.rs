//! Commands queued toward the network stack.
//!
//! Every request the integration makes of the stack travels through the
//! command queue as a [`StackCommand`]. The payload for each variant is owned
//! by the command itself, so the dispatcher can match exhaustively without
//! consulting a separate tag.

use core::fmt;

/// Default number of commands the integration queue can hold.
pub const DEFAULT_COMMAND_QUEUE_DEPTH: usize = 4;

/// Payload-free discriminant of a [`StackCommand`].
///
/// The context records the kind of the in-flight command and checks every
/// completion callback against it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    Init,
    Stop,
    SetRoute,
    RunNodeScript,
}

impl CommandKind {
    /// Returns `true` when the stack reports the command result through a
    /// completion callback rather than finishing inside the call.
    #[must_use]
    pub const fn completes_async(self) -> bool {
        matches!(
            self,
            CommandKind::Init | CommandKind::Stop | CommandKind::RunNodeScript
        )
    }

    /// Short label used in diagnostics and the operator console.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            CommandKind::Init => "init",
            CommandKind::Stop => "stop",
            CommandKind::SetRoute => "set-route",
            CommandKind::RunNodeScript => "run-node-script",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Request waiting in the integration queue.
///
/// `C` is the stack's init configuration, `R` its route handle and `N` its
/// node handle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StackCommand<C, R, N> {
    /// Start the stack with the supplied configuration.
    Init(C),
    /// Stop a running stack.
    Stop,
    /// Activate or deactivate a route.
    SetRoute { route: R, active: bool },
    /// Run the script list attached to a node.
    RunNodeScript(N),
}

impl<C, R, N> StackCommand<C, R, N> {
    /// Returns the payload-free discriminant for this command.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            StackCommand::Init(_) => CommandKind::Init,
            StackCommand::Stop => CommandKind::Stop,
            StackCommand::SetRoute { .. } => CommandKind::SetRoute,
            StackCommand::RunNodeScript(_) => CommandKind::RunNodeScript,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestCommand = StackCommand<u8, u16, u32>;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(TestCommand::Init(1).kind(), CommandKind::Init);
        assert_eq!(TestCommand::Stop.kind(), CommandKind::Stop);
        assert_eq!(
            TestCommand::SetRoute {
                route: 7,
                active: true
            }
            .kind(),
            CommandKind::SetRoute
        );
        assert_eq!(
            TestCommand::RunNodeScript(0x200).kind(),
            CommandKind::RunNodeScript
        );
    }

    #[test]
    fn only_route_commands_finish_synchronously() {
        assert!(CommandKind::Init.completes_async());
        assert!(CommandKind::Stop.completes_async());
        assert!(CommandKind::RunNodeScript.completes_async());
        assert!(!CommandKind::SetRoute.completes_async());
    }
}
