//! Operator console.
//!
//! Reads one command per line from the control channel (stdin in production).
//! Unknown commands are reported through the log, never back on the channel.

use crate::orchestrator::Shutdown;
use std::io::ErrorKind;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, error, info};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Shut the server down gracefully.
    Stop,
    /// Anything else, kept for the error report.
    Unknown(String),
}

impl Command {
    /// Surrounding whitespace is ignored; matching is case-sensitive.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "stop" => Command::Stop,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Why the listener loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// `stop` was entered.
    Shutdown,
    /// The control channel reached end of input or failed.
    InputClosed,
}

/// Background loop dispatching console commands.
pub struct CommandListener<R> {
    lines: Lines<R>,
    shutdown: Shutdown,
}

impl<R> CommandListener<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(input: R, shutdown: Shutdown) -> Self {
        Self {
            lines: input.lines(),
            shutdown,
        }
    }

    /// Serve commands until `stop` or end of input.
    pub async fn run(mut self) -> ListenerExit {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Console input closed, no longer accepting commands");
                    return ListenerExit::InputClosed;
                }
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    error!("Unknown command: <invalid UTF-8>.");
                    continue;
                }
                Err(e) => {
                    error!("Failed to read console input: {}", e);
                    return ListenerExit::InputClosed;
                }
            };

            match Command::parse(&line) {
                Command::Stop => {
                    if self.shutdown.trigger() {
                        info!("Stop requested from console");
                    } else {
                        debug!("Shutdown already in progress");
                    }
                    return ListenerExit::Shutdown;
                }
                Command::Unknown(input) => error!("Unknown command: {}.", input),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{build_dispatch, capture::CapturedLogs, SeverityLevel};
    use tokio::io::{AsyncWriteExt, BufReader};

    fn capture() -> (CapturedLogs, tracing::dispatcher::DefaultGuard) {
        let logs = CapturedLogs::default();
        let guard =
            tracing::dispatcher::set_default(&build_dispatch(SeverityLevel::Verbose, logs.clone()));
        (logs, guard)
    }

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("stop"), Command::Stop);
        assert_eq!(Command::parse("  stop\r"), Command::Stop);
        assert_eq!(Command::parse("STOP"), Command::Unknown("STOP".into()));
        assert_eq!(Command::parse("stop now"), Command::Unknown("stop now".into()));
        assert_eq!(Command::parse(""), Command::Unknown(String::new()));
    }

    #[tokio::test]
    async fn test_unknown_command_is_logged_and_ignored() {
        let (logs, _guard) = capture();
        let shutdown = Shutdown::new();

        let exit = CommandListener::new(&b"foo\n"[..], shutdown.clone()).run().await;

        assert_eq!(exit, ListenerExit::InputClosed);
        assert!(!shutdown.is_triggered());
        let out = logs.contents();
        assert!(out.contains("ERROR"));
        assert!(out.contains("Unknown command: foo."));
    }

    #[tokio::test]
    async fn test_stop_triggers_shutdown_once() {
        let shutdown = Shutdown::new();
        let exit = CommandListener::new(&b"foo\nstop\nstop\n"[..], shutdown.clone())
            .run()
            .await;

        assert_eq!(exit, ListenerExit::Shutdown);
        assert!(shutdown.is_triggered());
        assert!(!shutdown.trigger());
    }

    #[tokio::test]
    async fn test_stop_after_external_shutdown() {
        let (logs, _guard) = capture();
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let exit = CommandListener::new(&b"stop\n"[..], shutdown).run().await;

        assert_eq!(exit, ListenerExit::Shutdown);
        assert!(logs.contents().contains("Shutdown already in progress"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_the_loop() {
        let (logs, _guard) = capture();
        let shutdown = Shutdown::new();

        let exit = CommandListener::new(&b"\xff\xfe\nstop\n"[..], shutdown.clone())
            .run()
            .await;

        assert_eq!(exit, ListenerExit::Shutdown);
        assert!(logs.contents().contains("<invalid UTF-8>"));
    }

    #[tokio::test]
    async fn test_waits_for_lines_on_a_live_channel() {
        let (mut operator, console) = tokio::io::duplex(64);
        let shutdown = Shutdown::new();
        let listener = tokio::spawn(CommandListener::new(BufReader::new(console), shutdown.clone()).run());

        operator.write_all(b"status\n").await.unwrap();
        tokio::task::yield_now().await;
        assert!(!listener.is_finished());

        operator.write_all(b"stop\n").await.unwrap();
        assert_eq!(listener.await.unwrap(), ListenerExit::Shutdown);
        assert!(shutdown.is_triggered());
    }
}
