//! Built-in programs.
//!
//! The context ships a handful of demonstration commands. Each one reads
//! from the stdin port, writes to the stdout/stderr ports and returns an
//! exit code. Unknown commands print to stderr and exit 127.

use std::collections::BTreeMap;
use std::time::Duration;

use vos_ipc::{ContextPorts, PortReceiver, PortSender, SpawnParams, StreamMessage};

/// Exit code for a command that does not exist.
pub(crate) const EXIT_NOT_FOUND: i32 = 127;

/// Exit code for bad arguments.
const EXIT_USAGE: i32 = 2;

/// Stdio and environment handed to a running program.
pub(crate) struct ProgramIo {
    stdin: PortReceiver,
    stdout: PortSender,
    stderr: PortSender,
    cwd: String,
    env: BTreeMap<String, String>,
}

impl ProgramIo {
    pub(crate) fn new(ports: ContextPorts, params: &SpawnParams) -> Self {
        Self {
            stdin: ports.stdin,
            stdout: ports.stdout,
            stderr: ports.stderr,
            cwd: params.cwd.clone(),
            env: params.env.clone(),
        }
    }

    /// Write to stdout. False once the reader is gone.
    async fn out(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.stdout.data(bytes).await.is_ok()
    }

    async fn err(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.stderr.data(bytes).await;
    }

    /// Next stdin chunk, `None` on close.
    async fn read(&mut self) -> Option<Vec<u8>> {
        match self.stdin.recv().await {
            Some(StreamMessage::Data(bytes)) => Some(bytes),
            Some(StreamMessage::Close) | None => None,
        }
    }

    /// Close both output streams and release stdin.
    pub(crate) async fn finish(mut self) {
        let _ = self.stdout.close().await;
        let _ = self.stderr.close().await;
        self.stdin.close();
    }
}

/// Argument vector for a spawn request.
///
/// With `shell`, the command line is split on whitespace and the explicit
/// args follow it.
pub(crate) fn argv(params: &SpawnParams) -> Vec<String> {
    let mut argv: Vec<String> = if params.shell {
        params
            .command
            .split_whitespace()
            .map(String::from)
            .collect()
    } else {
        vec![params.command.clone()]
    };
    argv.extend(params.args.iter().cloned());
    argv
}

/// Run the program named by `params` to completion.
pub(crate) async fn run(params: &SpawnParams, io: &mut ProgramIo) -> i32 {
    let argv = argv(params);
    let Some((name, args)) = argv.split_first() else {
        io.err("vos: empty command\n").await;
        return EXIT_NOT_FOUND;
    };

    match name.as_str() {
        "echo" => {
            io.out(format!("{}\n", args.join(" "))).await;
            0
        }
        "cat" => {
            while let Some(chunk) = io.read().await {
                if !io.out(chunk).await {
                    break;
                }
            }
            0
        }
        "true" => 0,
        "false" => 1,
        "exit" => match args.first().map(|a| a.parse::<i32>()) {
            None => 0,
            Some(Ok(code)) => code,
            Some(Err(_)) => {
                io.err(format!("exit: {}: numeric argument required\n", args[0]))
                    .await;
                EXIT_USAGE
            }
        },
        "sleep" => match args.first().map(|a| a.parse::<u64>()) {
            Some(Ok(ms)) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                0
            }
            _ => {
                io.err("usage: sleep MILLISECONDS\n").await;
                EXIT_USAGE
            }
        },
        "pwd" => {
            io.out(format!("{}\n", io.cwd)).await;
            0
        }
        "env" => {
            let mut listing = String::new();
            for (key, value) in &io.env {
                listing.push_str(&format!("{}={}\n", key, value));
            }
            io.out(listing).await;
            0
        }
        "yes" => {
            let line = if args.is_empty() {
                String::from("y\n")
            } else {
                format!("{}\n", args.join(" "))
            };
            while io.out(line.clone()).await {
                tokio::task::yield_now().await;
            }
            0
        }
        other => {
            io.err(format!("{}: command not found\n", other)).await;
            EXIT_NOT_FOUND
        }
    }
}
