//! Interactive control commands read from stdin.
//!
//! One command per line:
//!
//! ```text
//! sort <key>      select or reverse a sort column (pid, type, name, cpu-total,
//!                 threads, memory-resident)
//! open <pid>      expand or collapse the threads of a process
//! hang <child-id> report a hung child process
//! hide | show     change display visibility
//! touch           note user activity (defers the next display)
//! refresh         force a display pass
//! quit            stop the monitor
//! ```

use anyhow::{anyhow, bail, Context, Result};
use herakles_proc_monitor::SortKey;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Control events queued for the refresh loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Sort(SortKey),
    Open(u32),
    Hang(u64),
    Hide,
    Show,
    Touch,
    Refresh,
    Quit,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| anyhow!("empty command"))?;
        let arg = parts.next();
        if parts.next().is_some() {
            bail!("too many arguments for '{}'", verb);
        }

        let required = |what: &str| arg.ok_or_else(|| anyhow!("'{}' needs a {}", verb, what));

        Ok(match verb {
            "sort" => ControlCommand::Sort(required("sort key")?.parse()?),
            "open" => ControlCommand::Open(
                required("pid")?
                    .parse()
                    .with_context(|| format!("invalid pid for '{}'", verb))?,
            ),
            "hang" => ControlCommand::Hang(
                required("child id")?
                    .parse()
                    .with_context(|| format!("invalid child id for '{}'", verb))?,
            ),
            "hide" => ControlCommand::Hide,
            "show" => ControlCommand::Show,
            "touch" => ControlCommand::Touch,
            "refresh" => ControlCommand::Refresh,
            "quit" | "exit" => ControlCommand::Quit,
            other => bail!("unknown command '{}'", other),
        })
    }
}

/// Reads commands from stdin until EOF. Invalid lines are logged and skipped.
pub fn spawn_stdin_reader(tx: mpsc::Sender<ControlCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match ControlCommand::parse(&line) {
                        Ok(cmd) => {
                            debug!("Control command: {:?}", cmd);
                            if tx.send(cmd).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring control input '{}': {:#}", line.trim(), e),
                    }
                }
                Ok(None) => {
                    debug!("stdin closed, control input disabled");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read control input: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            ControlCommand::parse("sort cpu-total").unwrap(),
            ControlCommand::Sort(SortKey::CpuTotal)
        );
        assert_eq!(
            ControlCommand::parse("  open 42 ").unwrap(),
            ControlCommand::Open(42)
        );
        assert_eq!(
            ControlCommand::parse("hang 7").unwrap(),
            ControlCommand::Hang(7)
        );
        assert_eq!(ControlCommand::parse("hide").unwrap(), ControlCommand::Hide);
        assert_eq!(ControlCommand::parse("exit").unwrap(), ControlCommand::Quit);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ControlCommand::parse("").is_err());
        assert!(ControlCommand::parse("open").is_err());
        assert!(ControlCommand::parse("open abc").is_err());
        assert!(ControlCommand::parse("hide now").is_err());
        assert!(ControlCommand::parse("dance").is_err());

        let err = ControlCommand::parse("sort column-bogus").unwrap_err();
        assert!(err.to_string().contains("unsupported sort key"));
    }
}
