use anyhow::Result;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use ucsi_core::UcsiOptions;

use session::{Session, SessionConfig};

const TRANSCRIPT_DIR: &str = "transcripts";

fn main() -> Result<()> {
    record("startup", &["status", "route 1 on", "advance 100ms", "status"])?;
    record(
        "init-retry",
        &["fail init count=2", "config preset-a", "status"],
    )?;
    record(
        "reconfigure",
        &[
            "node 0x200 up scripts=2",
            "config preset-b",
            "rx 24",
            "advance 1s",
            "status",
        ],
    )?;
    Ok(())
}

fn record(name: &str, commands: &[&str]) -> Result<()> {
    let config = SessionConfig {
        preset: "default".to_string(),
        options: UcsiOptions::default(),
        rx_buffers: 2,
        transcript: Some(format!("{TRANSCRIPT_DIR}/{name}.log").into()),
    };
    let (mut session, _) = Session::new(config)?;
    for command in commands {
        let _ = session.handle_command(command)?;
    }
    Ok(())
}
