mod config;

mod loader;
use loader::FileSource;

mod isa;
mod processor;
mod resolver;

mod debugger;
use debugger::Session;

mod tui;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing::{debug, Level};

#[derive(Parser, Debug)]
#[command(name = "vml")]
#[command(about = "Register virtual machine with an interactive debugger", long_about = None)]
struct Args {
    /// Start paused in the interactive debugger
    #[arg(short, long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Debug in a full-screen terminal UI instead of the line prompt
    #[arg(long, action = ArgAction::SetTrue)]
    tui: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Program image: a word count followed by that many integers
    program: PathBuf,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    // The TUI owns the terminal, log lines would corrupt it
    if !args.tui {
        init_logging(args.verbose);
    }

    let mut session = match Session::new(FileSource::new(&args.program), args.debug || args.tui) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.tui {
        return match tui::run(session) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Terminal error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let mut input = io::stdin().lock();
    let mut out = io::stdout().lock();
    let mut diag = io::stderr();
    match session.run(&mut input, &mut out, &mut diag) {
        Ok(exit) => {
            debug!(?exit, "session finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
