//! Operator console shared by front-ends.
//!
//! [`grammar`] turns a console line into a [`grammar::Command`]; [`status`]
//! renders the integration state for the `status` command. Executing the
//! commands is up to the front-end since most of them drive simulated
//! hardware.

pub mod grammar;
pub mod status;

/// Command name and usage line for every console command.
pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "status",
        "status                                  - show integration state",
    ),
    (
        "config",
        "config <name>                           - restart the stack with a preset",
    ),
    (
        "route",
        "route <id> on|off                       - queue a route activation change",
    ),
    (
        "node",
        "node <addr> up|down [scripts=<n>]       - report a node (dis)appearing",
    ),
    (
        "fail",
        "fail init [count=<n>]                   - fail the next init attempts",
    ),
    (
        "rx",
        "rx <len>                                - deliver a frame on the receive path",
    ),
    (
        "advance",
        "advance <duration>                      - advance the simulated clock",
    ),
    (
        "help",
        "help [topic]                            - show help for a command",
    ),
];

/// Looks up the usage line for `topic`, ignoring case.
#[must_use]
pub fn help_for(topic: &str) -> Option<&'static str> {
    HELP_TOPICS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
        .map(|(_, usage)| *usage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_has_help() {
        for name in [
            "status", "config", "route", "node", "fail", "rx", "advance", "help",
        ] {
            assert!(help_for(name).is_some(), "missing help for {name}");
        }
        assert_eq!(help_for("ROUTE"), help_for("route"));
        assert!(help_for("reboot").is_none());
    }
}
