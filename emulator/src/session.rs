use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use ucsi_core::console::grammar::{self, Command, NodeCommand, RouteCommand};
use ucsi_core::console::status::StatusFormatter;
use ucsi_core::console::{HELP_TOPICS, help_for};
use ucsi_core::host::{IntegrationHost, MessageSeverity};
use ucsi_core::sim::{ScriptedStack, SimEvent, SimNode, SimRoute};
use ucsi_core::stack::{ManagementReport, MostErrorMessage, NodeInfo};
use ucsi_core::telemetry::TelemetryInstant;
use ucsi_core::{ProtocolViolation, Ucsi, UcsiOptions};

/// Service iterations run per console command before the session gives up
/// on reaching an idle state.
const MAX_PUMP_ITERATIONS: usize = 64;

/// Control frame that carries a node report on the receive path.
const NODE_REPORT_FRAME: [u8; 6] = [0x02, 0x00, 0x06, 0x01, 0x00, 0x00];

/// Named stack configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    /// Network address of the local controller node.
    pub local_address: u16,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "default",
        local_address: 0x100,
    },
    Preset {
        name: "preset-a",
        local_address: 0x110,
    },
    Preset {
        name: "preset-b",
        local_address: 0x120,
    },
];

impl Preset {
    pub fn find(name: &str) -> Option<Preset> {
        PRESETS
            .iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(name))
            .copied()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transcript write failed: {0}")]
    Transcript(#[from] io::Error),

    #[error("network stack broke the command protocol: {0}")]
    Protocol(ProtocolViolation),

    #[error("unknown configuration preset `{0}`")]
    UnknownPreset(String),

    #[error("service loop did not settle after {0} iterations")]
    Runaway(usize),
}

/// Startup settings taken from the command line.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub preset: String,
    pub options: UcsiOptions,
    pub rx_buffers: u8,
    pub transcript: Option<PathBuf>,
}

/// Simulated monotonic instant, measured from session start.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(Duration);

impl SimInstant {
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Host side of the emulator: a simulated clock, the single application timer
/// and a zero-delay service flag.
#[derive(Debug, Default)]
pub struct EmulatorHost {
    now: SimInstant,
    timer_deadline: Option<SimInstant>,
    service_requested: bool,
    frames_sent: usize,
    bytes_sent: usize,
    output: Vec<String>,
}

impl EmulatorHost {
    fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    fn say(&mut self, line: String) {
        self.output.push(line);
    }
}

impl IntegrationHost for EmulatorHost {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.now
    }

    fn tick_ms(&self) -> u16 {
        u16::try_from(self.now.0.as_millis() % 65_536).unwrap_or_default()
    }

    fn arm_timer(&mut self, after: Duration) {
        debug!(after_ms = after.as_millis(), "application timer armed");
        self.timer_deadline = Some(SimInstant(self.now.0.saturating_add(after)));
    }

    fn cancel_timer(&mut self) {
        debug!("application timer cancelled");
        self.timer_deadline = None;
    }

    fn request_service(&mut self) {
        self.service_requested = true;
    }

    fn user_message(&mut self, severity: MessageSeverity, message: fmt::Arguments<'_>) {
        let text = message.to_string();
        match severity {
            MessageSeverity::Error => error!("{text}"),
            MessageSeverity::Warning => warn!("{text}"),
            MessageSeverity::Info => info!("{text}"),
            MessageSeverity::Debug => debug!("{text}"),
        }
        if severity <= MessageSeverity::Info {
            self.say(format!("{severity}: {text}"));
        }
    }

    fn send_bytes(&mut self, frame: &[u8]) {
        self.frames_sent += 1;
        self.bytes_sent += frame.len();
        debug!(len = frame.len(), "control frame sent");
    }

    fn on_stopped(&mut self) {
        self.say("stack stopped".to_string());
    }

    fn on_management_report(&mut self, report: ManagementReport, address: u16, node: Option<NodeInfo>) {
        let scripts = node.map_or(0, |node| node.script_count);
        self.say(format!("node 0x{address:03X} {report} scripts={scripts}"));
    }

    fn on_most_error(&mut self, message: &MostErrorMessage<'_>) {
        self.say(format!(
            "network error from 0x{:03X} fblock=0x{:02X} function=0x{:03X}",
            message.source_address, message.fblock, message.function
        ));
    }
}

type EmulatedUcsi = Ucsi<ScriptedStack<Preset>, EmulatorHost>;

pub struct Session {
    ucsi: EmulatedUcsi,
    transcript: Option<TranscriptLogger>,
    pending_rx: Option<Vec<u8>>,
}

impl Session {
    /// Creates the session and applies the startup preset.
    pub fn new(config: SessionConfig) -> Result<(Self, Vec<String>), SessionError> {
        let preset = Preset::find(&config.preset)
            .ok_or_else(|| SessionError::UnknownPreset(config.preset.clone()))?;
        let transcript = config
            .transcript
            .as_deref()
            .map(TranscriptLogger::new)
            .transpose()?;
        let stack = ScriptedStack::new().with_rx_buffers(config.rx_buffers);
        let mut session = Self {
            ucsi: Ucsi::new(stack, EmulatorHost::default(), config.options),
            transcript,
            pending_rx: None,
        };

        info!(preset = preset.name, "applying startup configuration");
        let mut lines = Vec::new();
        if !session.ucsi.apply_new_config(preset) {
            lines.push("ERR queue-full".to_string());
        }
        session.pump()?;
        lines.extend(session.ucsi.host_mut().take_output());
        session.record_output(&lines)?;
        Ok((session, lines))
    }

    pub fn handle_command(&mut self, line: &str) -> Result<Vec<String>, SessionError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let elapsed = self.elapsed();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(elapsed, TranscriptRole::Host, trimmed)?;
        }

        let mut lines = match grammar::parse(trimmed) {
            Ok(command) => self.execute(command)?,
            Err(err) => vec![format!("ERR syntax {err}")],
        };
        self.pump()?;
        lines.extend(self.ucsi.host_mut().take_output());

        self.record_output(&lines)?;
        Ok(lines)
    }

    fn execute(&mut self, command: Command<'_>) -> Result<Vec<String>, SessionError> {
        let lines = match command {
            Command::Status => self.status_lines(),
            Command::Config(name) => match Preset::find(name) {
                Some(preset) if self.ucsi.apply_new_config(preset) => {
                    vec![format!(
                        "OK config {} queued depth={}",
                        preset.name,
                        self.ucsi.queued()
                    )]
                }
                Some(_) => vec!["ERR queue-full".to_string()],
                None => vec![format!("ERR {}", SessionError::UnknownPreset(name.to_string()))],
            },
            Command::Route(RouteCommand { id, active }) => {
                if self.ucsi.set_route_active(SimRoute(id), active) {
                    let state = if active { "on" } else { "off" };
                    vec![format!("OK route {id} {state} queued")]
                } else {
                    vec!["ERR queue-full".to_string()]
                }
            }
            Command::Node(node) => self.inject_node(node),
            Command::FailInit { count } => {
                let count = count.unwrap_or(1);
                self.ucsi.stack_mut().fail_next_inits(count);
                vec![format!("OK next {count} init attempt(s) will fail")]
            }
            Command::Rx { len } => self.receive(vec![0x5A; usize::from(len)]),
            Command::Advance(duration) => match self.ucsi.host().now.0.checked_add(duration) {
                Some(target) => {
                    let fired = self.advance_to(SimInstant(target))?;
                    vec![format!(
                        "OK clock=+{}ms timers-fired={fired}",
                        self.elapsed().as_millis()
                    )]
                }
                None => vec!["ERR clock overflow".to_string()],
            },
            Command::Help(help) => help_lines(help.topic),
        };
        Ok(lines)
    }

    fn inject_node(&mut self, command: NodeCommand) -> Vec<String> {
        let node = SimNode::new(command.address, command.scripts.unwrap_or(0));
        let report = if command.available {
            ManagementReport::Available
        } else {
            ManagementReport::NotAvailable
        };
        let scheduled = self.ucsi.stack_mut().schedule(SimEvent::ManagementReport {
            report,
            address: command.address,
            node: Some(node),
        });
        if !scheduled {
            return vec!["ERR stack event backlog full".to_string()];
        }
        self.receive(NODE_REPORT_FRAME.to_vec())
    }

    fn receive(&mut self, bytes: Vec<u8>) -> Vec<String> {
        if !self.ucsi.transport_attached() {
            return vec!["ERR transport detached".to_string()];
        }
        if self.pending_rx.is_some() {
            return vec!["ERR receive path busy".to_string()];
        }
        let len = bytes.len();
        if self.ucsi.submit_received_bytes(&bytes) {
            vec![format!("OK rx {len} bytes")]
        } else {
            self.pending_rx = Some(bytes);
            vec![format!("OK rx {len} bytes deferred (no buffer)")]
        }
    }

    /// Moves the clock to `target`, firing the application timer on the way.
    fn advance_to(&mut self, target: SimInstant) -> Result<usize, SessionError> {
        let mut fired = 0;
        while let Some(deadline) = self
            .ucsi
            .host()
            .timer_deadline
            .filter(|deadline| *deadline <= target)
        {
            let host = self.ucsi.host_mut();
            host.now = deadline;
            host.timer_deadline = None;
            self.ucsi.on_timer_expired().map_err(SessionError::Protocol)?;
            fired += 1;
            self.pump()?;
        }
        self.ucsi.host_mut().now = target;
        Ok(fired)
    }

    /// Runs requested service calls and due zero-delay timers until idle.
    fn pump(&mut self) -> Result<(), SessionError> {
        for _ in 0..MAX_PUMP_ITERATIONS {
            if let Some(bytes) = self.pending_rx.take() {
                if !self.ucsi.submit_received_bytes(&bytes) {
                    self.pending_rx = Some(bytes);
                }
            }

            let host = self.ucsi.host_mut();
            let timer_due = host.timer_deadline.is_some_and(|deadline| deadline <= host.now);
            if timer_due {
                host.timer_deadline = None;
                self.ucsi.on_timer_expired().map_err(SessionError::Protocol)?;
                continue;
            }

            let host = self.ucsi.host_mut();
            if !host.service_requested {
                return Ok(());
            }
            host.service_requested = false;
            self.ucsi.service().map_err(SessionError::Protocol)?;
        }
        Err(SessionError::Runaway(MAX_PUMP_ITERATIONS))
    }

    fn status_lines(&self) -> Vec<String> {
        let snapshot = self.ucsi.status_snapshot();
        let formatter = StatusFormatter::new(&snapshot);
        let mut lines = Vec::new();
        for write in [
            StatusFormatter::write_stack_line::<String>,
            StatusFormatter::write_queue_line::<String>,
            StatusFormatter::write_init_line::<String>,
            StatusFormatter::write_protocol_line::<String>,
        ] {
            let mut line = String::new();
            if write(&formatter, &mut line).is_ok() {
                lines.push(line);
            }
        }

        let host = self.ucsi.host();
        let timer = host.timer_deadline.map_or_else(
            || "idle".to_string(),
            |deadline| format!("+{}ms", deadline.since_start().as_millis()),
        );
        let config = self
            .ucsi
            .stack()
            .active_config()
            .map_or("none", |preset| preset.name);
        lines.push(format!(
            "host clock=+{}ms timer={timer} frames={} bytes={} config={config}",
            host.now.since_start().as_millis(),
            host.frames_sent,
            host.bytes_sent
        ));
        lines
    }

    fn elapsed(&self) -> Duration {
        self.ucsi.host().now.since_start()
    }

    fn record_output(&mut self, lines: &[String]) -> Result<(), SessionError> {
        let elapsed = self.elapsed();
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(elapsed, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => match help_for(target) {
            Some(usage) => lines.push(usage.to_string()),
            None => {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        },
        None => {
            lines.push("Available commands:".to_string());
            for (_, usage) in HELP_TOPICS {
                lines.push(format!("  {usage}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

struct TranscriptLogger {
    writer: BufWriter<File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# UCSI emulator transcript")?;
        writeln!(
            logger.writer,
            "# Timestamps are simulated milliseconds since session start"
        )?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, elapsed: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (Session, Vec<String>) {
        Session::new(SessionConfig {
            preset: "default".to_string(),
            options: UcsiOptions::default(),
            rx_buffers: 1,
            transcript: None,
        })
        .expect("session should start")
    }

    fn has(lines: &[String], needle: &str) -> bool {
        lines.iter().any(|line| line.contains(needle))
    }

    #[test]
    fn startup_initializes_the_stack() {
        let (session, lines) = session();
        assert!(has(&lines, "network stack initialized"), "{lines:?}");
        assert!(session.ucsi.is_initialized());
    }

    #[test]
    fn config_command_restarts_with_the_preset() {
        let (mut session, _) = session();
        let lines = session
            .handle_command("config preset-b")
            .expect("command should run");
        assert!(has(&lines, "OK config preset-b queued depth=2"), "{lines:?}");
        assert!(has(&lines, "stack stopped"), "{lines:?}");
        assert_eq!(
            session.ucsi.stack().active_config().map(|preset| preset.name),
            Some("preset-b")
        );
    }

    #[test]
    fn failed_inits_are_retried_until_success() {
        let (mut session, _) = session();
        session
            .handle_command("fail init count=2")
            .expect("command should run");
        let lines = session
            .handle_command("config preset-a")
            .expect("command should run");
        let restarts = lines
            .iter()
            .filter(|line| line.contains("restarting..."))
            .count();
        assert_eq!(restarts, 2, "{lines:?}");
        assert!(has(&lines, "network stack initialized"));
    }

    #[test]
    fn node_report_runs_scripts() {
        let (mut session, _) = session();
        let lines = session
            .handle_command("node 0x200 up scripts=1")
            .expect("command should run");
        assert!(has(&lines, "node 0x200 available scripts=1"), "{lines:?}");
        assert!(has(&lines, "node 0x200: script execution succeeded"), "{lines:?}");
    }

    #[test]
    fn advance_fires_the_application_timer() {
        let (mut session, _) = session();
        assert!(session.ucsi.host().timer_deadline.is_some());
        let lines = session
            .handle_command("advance 1s")
            .expect("command should run");
        assert!(has(&lines, "timers-fired=1"), "{lines:?}");
        assert_eq!(session.ucsi.stack().timeouts(), 1);
    }

    #[test]
    fn advance_past_the_end_of_the_clock_is_refused() {
        let (mut session, _) = session();
        let lines = session
            .handle_command("advance 18446744073709551615s")
            .expect("command should run");
        assert!(has(&lines, "OK clock=+"), "{lines:?}");

        let lines = session
            .handle_command("advance 1s")
            .expect("command should run");
        assert_eq!(lines, ["ERR clock overflow"]);

        let lines = session.handle_command("status").expect("status should run");
        assert!(has(&lines, "stack initialized=yes"), "{lines:?}");
    }

    #[test]
    fn syntax_errors_are_reported() {
        let (mut session, _) = session();
        let lines = session
            .handle_command("route on")
            .expect("command should run");
        assert!(lines[0].starts_with("ERR syntax"), "{lines:?}");
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let (mut session, _) = session();
        let lines = session
            .handle_command("config nope")
            .expect("command should run");
        assert_eq!(lines, ["ERR unknown configuration preset `nope`"]);
    }
}
