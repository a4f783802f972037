use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::debug;

use crate::config;
use crate::loader::{LoadError, ProgramSource};
use crate::processor::{format_registers, Fault, Outcome, Processor};
use crate::resolver::{resolve_address, resolve_register, ResolveError};

pub const HELP: &str = "\
Debugger commands (may be abbreviated):
  help      - Prints this message
  quit      - Exits the virtual machine
  list [N]  - Disassembles the next N instructions (default 5)
  print R   - Prints the value of register R (r0-r31, ip, rp, fp, sp)
  x A       - Prints the value in memory at address A
  frame [N] - Displays the top N values on the stack (default from SP to FP)
  step [N]  - Executes N instructions (default 1)
  continue  - Runs until the next breakpoint, fault or halt
  restart   - Reloads the program and resets the machine
  break [A] - Pauses execution whenever IP == A (default current IP)
  delete    - Deletes the breakpoint

Wherever an address is expected a register name may be given instead, in
which case the value held in that register is used as the address.
";

const COMMAND_NAMES: [&str; 10] = [
    "help", "quit", "list", "print", "frame", "step", "continue", "restart", "break", "delete",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    List(Option<String>),
    Print(Option<String>),
    Examine(Option<String>),
    Frame(Option<String>),
    Step(Option<String>),
    Continue,
    Restart,
    Break(Option<String>),
    Delete,
}

impl Command {
    /// Builds a command from its word and optional argument. `x` must be
    /// typed exactly; every other word may be any unambiguous prefix.
    pub fn parse(word: &str, arg: Option<&str>) -> Option<Command> {
        let arg = arg.map(str::to_string);
        if word == "x" {
            return Some(Command::Examine(arg));
        }

        let command = match match_prefix(word, &COMMAND_NAMES)? {
            "help" => Command::Help,
            "quit" => Command::Quit,
            "list" => Command::List(arg),
            "print" => Command::Print(arg),
            "frame" => Command::Frame(arg),
            "step" => Command::Step(arg),
            "continue" => Command::Continue,
            "restart" => Command::Restart,
            "break" => Command::Break(arg),
            "delete" => Command::Delete,
            _ => return None,
        };
        Some(command)
    }
}

/// Returns the single name that `typed` is a case-insensitive prefix of.
/// No match or several matches give `None`.
pub fn match_prefix<'a>(typed: &str, names: &[&'a str]) -> Option<&'a str> {
    if typed.is_empty() {
        return None;
    }
    let typed = typed.to_ascii_lowercase();
    let mut candidates = names.iter().filter(|name| name.starts_with(typed.as_str()));
    match (candidates.next(), candidates.next()) {
        (Some(name), None) => Some(*name),
        _ => None,
    }
}

/// Splits a command line into its command word and first argument.
pub fn split_command_line(line: &str) -> Option<(&str, Option<&str>)> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    Some((command, words.next()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Halted,
    Quit,
}

/// Where the session loop stands after one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Paused; the next iteration needs a command line (or end of input).
    NeedCommand,
    Running,
    Finished(Exit),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("Machine reset failed, exiting: {0}")]
    Restart(#[source] LoadError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub struct Session<S: ProgramSource> {
    source: S,
    machine: Processor,
    debug: bool,
    paused: bool,
    breakpoint: Option<usize>,
    pending_steps: u32,
}

impl<S: ProgramSource> Session<S> {
    /// Loads the program. A debug session starts paused at the first instruction.
    pub fn new(source: S, debug: bool) -> Result<Self, LoadError> {
        let image = source.load()?;
        Ok(Session {
            machine: Processor::with_image(&image),
            source,
            debug,
            paused: debug,
            breakpoint: None,
            pending_steps: 0,
        })
    }

    pub fn machine(&self) -> &Processor {
        &self.machine
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn is_paused(&self) -> bool {
        self.debug && self.paused
    }

    pub fn breakpoint(&self) -> Option<usize> {
        self.breakpoint
    }

    /// True while a `step N` batch still has instructions left to run.
    pub fn has_pending_steps(&self) -> bool {
        self.pending_steps > 0
    }

    pub fn prompt(&self) -> String {
        format!("dbg[{:03}]> ", self.machine.ip())
    }

    /// Runs one loop iteration that needs no operator input: the breakpoint
    /// check and, unless paused, one instruction.
    pub fn advance(&mut self, out: &mut dyn Write, diag: &mut dyn Write) -> Result<Poll, SessionError> {
        if self.debug && !self.paused && self.at_breakpoint() {
            writeln!(diag, "Hit breakpoint at {}", self.machine.ip())?;
            debug!(ip = self.machine.ip(), "paused at breakpoint");
            self.paused = true;
            self.pending_steps = 0;
        }

        if self.debug && self.paused {
            if self.pending_steps == 0 {
                return Ok(Poll::NeedCommand);
            }
            self.pending_steps -= 1;
        }
        self.execute_step(out, diag)
    }

    /// Feeds one command line while paused; `None` means the input ended.
    pub fn submit(
        &mut self,
        line: Option<&str>,
        out: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> Result<Poll, SessionError> {
        let Some(line) = line else {
            writeln!(diag, "\nEnd of input, continuing program")?;
            debug!("end of command input, leaving debug mode");
            self.debug = false;
            self.pending_steps = 0;
            return Ok(Poll::Running);
        };
        if !self.is_paused() {
            return Ok(Poll::Running);
        }

        let Some((word, arg)) = split_command_line(line) else {
            return Ok(Poll::NeedCommand);
        };
        match Command::parse(word, arg) {
            Some(command) => self.execute(command, out, diag),
            None => {
                debug!(word, "ignoring unrecognized command");
                Ok(Poll::NeedCommand)
            }
        }
    }

    pub fn execute(
        &mut self,
        command: Command,
        out: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> Result<Poll, SessionError> {
        match command {
            Command::Help => write!(diag, "{}", HELP)?,
            Command::Quit => return Ok(Poll::Finished(Exit::Quit)),
            Command::List(_) => writeln!(diag, "list command not yet implemented")?,
            Command::Frame(_) => writeln!(diag, "frame command not yet implemented")?,
            Command::Print(None) => writeln!(diag, "print command requires an argument")?,
            Command::Print(Some(name)) => match resolve_register(&name) {
                Some(index) => writeln!(diag, "{}: {}", name, self.machine.registers()[index])?,
                None => writeln!(diag, "bad register name: `{}'", name)?,
            },
            Command::Examine(None) => writeln!(diag, "x command requires an argument")?,
            Command::Examine(Some(token)) => match resolve_address(&token, self.machine.registers()) {
                Ok(addr) => writeln!(diag, "{:03}: {}", addr, self.machine.memory()[addr])?,
                Err(err) => writeln!(diag, "{}", err)?,
            },
            Command::Step(count) => {
                let count = match count {
                    None => 1,
                    Some(token) => match token.parse::<u32>() {
                        Ok(n) if n > 0 => n,
                        _ => {
                            writeln!(diag, "bad step count: `{}'", token)?;
                            return Ok(Poll::NeedCommand);
                        }
                    },
                };
                self.pending_steps = count - 1;
                return self.execute_step(out, diag);
            }
            Command::Continue => {
                debug!(ip = self.machine.ip(), "continuing");
                self.paused = false;
                self.pending_steps = 0;
                // At least one instruction runs before the next breakpoint check
                return self.execute_step(out, diag);
            }
            Command::Restart => {
                let image = self.source.load().map_err(SessionError::Restart)?;
                self.machine = Processor::with_image(&image);
                self.pending_steps = 0;
                debug!(source = self.source.name(), "machine restarted");
            }
            Command::Break(arg) => {
                let resolved = match arg {
                    Some(token) => resolve_address(&token, self.machine.registers()),
                    None => current_ip_address(self.machine.ip()),
                };
                match resolved {
                    Ok(addr) => {
                        self.breakpoint = Some(addr);
                        writeln!(diag, "Breakpoint set at address {}", addr)?;
                    }
                    Err(err) => writeln!(diag, "{}", err)?,
                }
            }
            Command::Delete => match self.breakpoint.take() {
                Some(addr) => writeln!(diag, "Breakpoint deleted (was {})", addr)?,
                None => writeln!(diag, "No breakpoint set")?,
            },
        }
        Ok(Poll::NeedCommand)
    }

    /// Line-oriented main loop: prompts on `diag`, reads commands from
    /// `input` while paused, and writes `OUT` values to `out`.
    pub fn run(
        &mut self,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> Result<Exit, SessionError> {
        loop {
            let mut poll = self.advance(out, diag)?;
            if poll == Poll::NeedCommand {
                write!(diag, "{}", self.prompt())?;
                diag.flush()?;
                let line = read_command_line(input, diag)?;
                poll = self.submit(line.as_deref(), out, diag)?;
            }
            if let Poll::Finished(exit) = poll {
                return Ok(exit);
            }
        }
    }

    fn at_breakpoint(&self) -> bool {
        self.breakpoint.is_some() && usize::try_from(self.machine.ip()).ok() == self.breakpoint
    }

    fn execute_step(&mut self, out: &mut dyn Write, diag: &mut dyn Write) -> Result<Poll, SessionError> {
        match self.machine.step() {
            Ok(Outcome::Continue) => Ok(Poll::Running),
            Ok(Outcome::Output(value)) => {
                writeln!(out, "{}", value)?;
                Ok(Poll::Running)
            }
            Ok(Outcome::Halt) => {
                if self.debug {
                    writeln!(diag, "Program exited normally")?;
                }
                Ok(Poll::Finished(Exit::Halted))
            }
            Err(fault) => {
                if !self.debug {
                    return Err(fault.into());
                }
                debug!(%fault, registers = %format_registers(&self.machine), "execution fault, pausing");
                writeln!(diag, "{}", fault)?;
                self.paused = true;
                self.pending_steps = 0;
                Ok(Poll::NeedCommand)
            }
        }
    }
}

fn current_ip_address(ip: i32) -> Result<usize, ResolveError> {
    match usize::try_from(ip) {
        Ok(addr) if addr < config::MEMORY_SIZE => Ok(addr),
        _ => Err(ResolveError::OutOfRange(ip.to_string())),
    }
}

/// A read failure is reported and then handled like end of input.
fn read_command_line(input: &mut dyn BufRead, diag: &mut dyn Write) -> io::Result<Option<String>> {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(line)),
        Err(err) => {
            writeln!(diag, "Unexpected error when reading command: {}", err)?;
            Ok(None)
        }
    }
}
