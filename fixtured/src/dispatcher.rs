//! Line-oriented command protocol
//!
//! Requests are `<name> [arg ...]\n`. Replies:
//!
//! ```text
//! <name> [OK]               command returned true
//! <name> [ERR]              command returned false
//! [ERR] <message>           command raised an error
//! not found function [ERR]  no such command
//! ```
//!
//! Commands may emit extra lines, which are written before the reply.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use fixture_core::{Arg, CommandFrame, FixtureError, Result};
use fixture_hardware::SerialLink;
use tracing::{debug, warn};

use crate::controller::FixtureController;

const LINE_FEED: u8 = b'\n';

/// Every command the controller answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    FixtureIn,
    FixtureOut,
    FixtureUp,
    FixtureDown,
    FixtureReset,
    FixtureRun,
    FixtureUninsert,
    CtlOut,
    LoopTest,
    LoopTest1,
    LedStateValue,
    LedOff,
    GetPinStatus,
    SetPinStatus,
    GetAllStatus,
    GetStatus,
    FixtureParaGet,
    FixtureParaSet,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Command::FixtureIn,
        Command::FixtureOut,
        Command::FixtureUp,
        Command::FixtureDown,
        Command::FixtureReset,
        Command::FixtureRun,
        Command::FixtureUninsert,
        Command::CtlOut,
        Command::LoopTest,
        Command::LoopTest1,
        Command::LedStateValue,
        Command::LedOff,
        Command::GetPinStatus,
        Command::SetPinStatus,
        Command::GetAllStatus,
        Command::GetStatus,
        Command::FixtureParaGet,
        Command::FixtureParaSet,
    ];

    /// Wire name
    pub fn name(self) -> &'static str {
        match self {
            Command::FixtureIn => "fixture_in",
            Command::FixtureOut => "fixture_out",
            Command::FixtureUp => "fixture_up",
            Command::FixtureDown => "fixture_down",
            Command::FixtureReset => "fixture_reset",
            Command::FixtureRun => "fixture_run",
            Command::FixtureUninsert => "fixture_uninsert",
            Command::CtlOut => "ctl_out",
            Command::LoopTest => "loop_test",
            Command::LoopTest1 => "loop_test1",
            Command::LedStateValue => "led_state_value",
            Command::LedOff => "led_off",
            Command::GetPinStatus => "get_pin_status",
            Command::SetPinStatus => "set_pin_status",
            Command::GetAllStatus => "get_all_status",
            Command::GetStatus => "get_status",
            Command::FixtureParaGet => "fixture_para_get",
            Command::FixtureParaSet => "fixture_para_set",
        }
    }

    /// Names of the positional parameters, all required
    pub fn params(self) -> &'static [&'static str] {
        match self {
            Command::FixtureUninsert | Command::CtlOut => &["value"],
            Command::LoopTest | Command::LoopTest1 => &["num"],
            Command::LedStateValue => &["slot", "color"],
            Command::GetPinStatus => &["name"],
            Command::SetPinStatus => &["name", "value"],
            Command::FixtureParaGet => &["key"],
            Command::FixtureParaSet => &["key", "value"],
            _ => &[],
        }
    }

    fn check_arity(self, args: &[Arg]) -> Result<()> {
        let params = self.params();
        if args.len() == params.len() {
            return Ok(());
        }
        Err(FixtureError::InvalidArgument(format!(
            "{}() takes {} argument(s) ({}) but {} were given",
            self.name(),
            params.len(),
            params.join(", "),
            args.len()
        )))
    }
}

/// Command name lookup, built once
pub struct CommandTable {
    commands: HashMap<&'static str, Command>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            commands: Command::ALL.iter().map(|c| (c.name(), *c)).collect(),
        }
    }
}

impl CommandTable {
    pub fn lookup(&self, name: &str) -> Option<Command> {
        self.commands.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Result of a command that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    /// Extra lines written ahead of the reply
    pub lines: Vec<String>,
}

impl Outcome {
    pub fn with_lines(success: bool, lines: Vec<String>) -> Self {
        Self { success, lines }
    }
}

impl From<bool> for Outcome {
    fn from(success: bool) -> Self {
        Self {
            success,
            lines: Vec::new(),
        }
    }
}

/// Final status line of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(String),
    Failed(String),
    Error(String),
    NotFound,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok(name) => writeln!(f, "{} [OK]", name),
            Reply::Failed(name) => writeln!(f, "{} [ERR]", name),
            Reply::Error(message) => writeln!(f, "[ERR] {}", message),
            Reply::NotFound => writeln!(f, "not found function [ERR]"),
        }
    }
}

/// Everything written back for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub lines: Vec<String>,
    pub reply: Reply,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        self.reply.fmt(f)
    }
}

/// Accumulates bytes into complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
    lines: VecDeque<Vec<u8>>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes; each line feed completes a line.
    pub fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.partial.push(b);
            if b == LINE_FEED {
                self.lines.push_back(std::mem::take(&mut self.partial));
            }
        }
    }

    /// Oldest complete line, line feed included
    pub fn pop_line(&mut self) -> Option<Vec<u8>> {
        self.lines.pop_front()
    }

    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    /// Bytes of an unfinished line
    pub fn partial(&self) -> &[u8] {
        &self.partial
    }
}

/// Parses request lines and runs them against the controller
#[derive(Default)]
pub struct Dispatcher {
    table: CommandTable,
    buffer: LineBuffer,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    /// Run one request line and build its response.
    pub async fn dispatch(&self, controller: &mut FixtureController, line: &[u8]) -> Response {
        let frame = CommandFrame::parse(line);
        let Some(command) = self.table.lookup(&frame.name) else {
            debug!("Unknown command {:?}", frame.name);
            return Response {
                lines: Vec::new(),
                reply: Reply::NotFound,
            };
        };

        debug!("Dispatching {} {:?}", frame.name, frame.args);
        let result = match command.check_arity(&frame.args) {
            Ok(()) => controller.execute(command, &frame.args).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => Response {
                lines: outcome.lines,
                reply: if outcome.success {
                    Reply::Ok(frame.name)
                } else {
                    Reply::Failed(frame.name)
                },
            },
            Err(e) => {
                warn!("Command {} failed: {}", frame.name, e);
                Response {
                    lines: Vec::new(),
                    reply: Reply::Error(e.to_string()),
                }
            }
        }
    }

    /// Pull pending bytes from `link`, run at most one complete line and
    /// write its response. Returns whether a line was handled.
    pub async fn service(
        &mut self,
        controller: &mut FixtureController,
        link: &mut dyn SerialLink,
    ) -> Result<bool> {
        let bytes = link.read_available()?;
        self.buffer.push(&bytes);

        let Some(line) = self.buffer.pop_line() else {
            return Ok(false);
        };
        let response = self.dispatch(controller, &line).await;
        link.write_all(response.to_string().as_bytes()).await?;
        Ok(true)
    }
}
