//! Interactive emulator for the UCSI integration core.
//!
//! Drives the integration against the scripted network stack with a simulated
//! clock, so command queue behavior can be explored from a terminal.

mod session;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ucsi_core::UcsiOptions;
use ucsi_core::integration::DEFAULT_INIT_RETRY_BUDGET;

use session::{Session, SessionConfig};

/// UCSI integration emulator
#[derive(Parser, Debug)]
#[command(name = "ucsi-emulator")]
#[command(about = "Drive the UCSI integration core against a scripted network stack", long_about = None)]
struct Args {
    /// Configuration preset applied at startup
    #[arg(long, default_value = "default")]
    preset: String,

    /// Consecutive init failures retried before giving up
    #[arg(long, default_value_t = DEFAULT_INIT_RETRY_BUDGET)]
    init_retries: u8,

    /// Retry failed inits forever
    #[arg(long, conflicts_with = "init_retries")]
    retry_forever: bool,

    /// Don't log resource manager debug reports
    #[arg(long)]
    no_resource_debug: bool,

    /// Receive buffers owned by the scripted stack
    #[arg(long, default_value_t = 2)]
    rx_buffers: u8,

    /// Write a session transcript to this file
    #[arg(long)]
    transcript: Option<PathBuf>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let budget = (!self.retry_forever).then_some(self.init_retries);
        SessionConfig {
            preset: self.preset.clone(),
            options: UcsiOptions::default()
                .with_init_retry_budget(budget)
                .with_resource_debug(!self.no_resource_debug),
            rx_buffers: self.rx_buffers,
            transcript: self.transcript.clone(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ucsi_emulator=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    info!("Starting UCSI emulator v{}", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    let (mut session, startup) =
        Session::new(args.session_config()).context("failed to start the emulator session")?;
    writeln!(
        writer,
        "UCSI Emulator ready. Type `help` for commands or `exit` to quit."
    )?;
    for line in startup {
        writeln!(writer, "{line}")?;
    }

    let mut line = String::new();
    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session
            .handle_command(trimmed)
            .with_context(|| format!("command `{trimmed}` failed"))?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}
