use crate::config;
use crate::debugger::{Exit, Poll, Session, SessionError};
use crate::loader::ProgramSource;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;
use tui_textarea::TextArea;

// Instructions executed between two UI refreshes while running
const STEPS_PER_FRAME: usize = 10_000;
const MAX_LOG_LINES: usize = 1_000;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Pane {
    Registers,
    Memory,
    Logs,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum NumFormat {
    Hex,
    Binary,
    Decimal,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum RunMode {
    Paused,
    Running,
    Finished,
}

pub struct App<'a, S: ProgramSource> {
    pub session: Session<S>,
    pub command: TextArea<'a>,
    pub active_pane: Pane,
    pub number_format: NumFormat,
    pub registers_scroll: u16,
    pub memory_scroll: u16,
    pub logs_scroll: u16,
    pub logs: Vec<String>,
    pub finished: bool,
    pub should_quit: bool,
}

fn command_line<'a>() -> TextArea<'a> {
    let mut command = TextArea::default();
    command.set_cursor_line_style(ratatui::style::Style::default());
    command
}

impl<'a, S: ProgramSource> App<'a, S> {
    pub fn new(session: Session<S>) -> App<'a, S> {
        let mut app = App {
            session,
            command: command_line(),
            active_pane: Pane::Memory,
            number_format: NumFormat::Decimal,
            registers_scroll: 0,
            memory_scroll: 0,
            logs_scroll: 0,
            logs: vec![],
            finished: false,
            should_quit: false,
        };
        app.log(format!("Loaded {}", app.session.source_name()));
        app
    }

    pub fn mode(&self) -> RunMode {
        if self.finished {
            RunMode::Finished
        } else if self.session.is_paused() && !self.session.has_pending_steps() {
            RunMode::Paused
        } else {
            RunMode::Running
        }
    }

    fn log(&mut self, line: String) {
        self.logs.push(line);
        if self.logs.len() > MAX_LOG_LINES {
            let excess = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(..excess);
        }
    }

    /// Moves what the session wrote to its two channels into the log pane.
    fn collect(&mut self, out: Vec<u8>, diag: Vec<u8>) {
        for line in String::from_utf8_lossy(&diag).lines().filter(|l| !l.is_empty()) {
            self.log(line.to_string());
        }
        for line in String::from_utf8_lossy(&out).lines() {
            self.log(format!("out: {}", line));
        }
    }

    fn handle(&mut self, result: Result<Poll, SessionError>) {
        match result {
            Ok(Poll::Finished(Exit::Quit)) => self.should_quit = true,
            Ok(Poll::Finished(Exit::Halted)) => {
                self.log("Program halted".to_string());
                self.finished = true;
            }
            Ok(_) => {}
            Err(e) => {
                self.log(format!("Stopped: {}", e));
                self.finished = true;
            }
        }
    }

    /// Sends one command line to the paused session.
    pub fn submit(&mut self, line: &str) {
        if self.mode() != RunMode::Paused {
            return;
        }
        self.log(format!("{}{}", self.session.prompt(), line));
        let mut out = Vec::new();
        let mut diag = Vec::new();
        let result = self.session.submit(Some(line), &mut out, &mut diag);
        self.collect(out, diag);
        self.handle(result);
        self.command = command_line();
    }

    /// Drives the engine until it pauses, finishes or the batch runs out.
    pub fn run_batch(&mut self) {
        let mut out = Vec::new();
        let mut diag = Vec::new();
        let mut result = Ok(Poll::Running);
        for _ in 0..STEPS_PER_FRAME {
            if self.finished {
                break;
            }
            result = self.session.advance(&mut out, &mut diag);
            if !matches!(result, Ok(Poll::Running)) {
                break;
            }
        }
        self.collect(out, diag);
        self.handle(result);
    }
}

pub fn run<S: ProgramSource>(session: Session<S>) -> Result<(), io::Error> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let app = App::new(session);
    let res = run_app(&mut terminal, app);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend, S: ProgramSource>(
    terminal: &mut Terminal<B>,
    mut app: App<S>,
) -> io::Result<()> {
    loop {
        if app.mode() == RunMode::Running {
            app.run_batch();
        }
        if app.should_quit {
            return Ok(());
        }

        terminal.draw(|f| ui::draw(f, &mut app))?;

        // Keep the engine going while running; otherwise wait for a key
        let timeout = if app.mode() == RunMode::Running { Duration::ZERO } else { Duration::from_millis(250) };
        if !event::poll(timeout)? {
            continue;
        }

        if let Event::Key(key) = event::read()? {
            if key.kind != event::KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    app.active_pane = match app.active_pane {
                        Pane::Registers => Pane::Memory,
                        Pane::Memory => Pane::Logs,
                        Pane::Logs => Pane::Registers,
                    };
                }
                KeyCode::F(9) => {
                    app.number_format = match app.number_format {
                        NumFormat::Hex => NumFormat::Binary,
                        NumFormat::Binary => NumFormat::Decimal,
                        NumFormat::Decimal => NumFormat::Hex,
                    };
                }
                KeyCode::F(10) => app.submit("step"),
                KeyCode::F(5) => app.submit("continue"),
                KeyCode::Enter => {
                    let line = app.command.lines().first().cloned().unwrap_or_default();
                    app.submit(&line);
                }
                KeyCode::Up => match app.active_pane {
                    Pane::Registers => app.registers_scroll = app.registers_scroll.saturating_sub(1),
                    Pane::Memory => app.memory_scroll = app.memory_scroll.saturating_sub(1),
                    Pane::Logs => app.logs_scroll = app.logs_scroll.saturating_add(1),
                },
                KeyCode::Down => match app.active_pane {
                    Pane::Registers => {
                        app.registers_scroll = app.registers_scroll.saturating_add(1).min(config::NUM_REGISTERS as u16 - 1)
                    }
                    Pane::Memory => {
                        app.memory_scroll = app.memory_scroll.saturating_add(1).min(config::MEMORY_SIZE as u16 - 1)
                    }
                    Pane::Logs => app.logs_scroll = app.logs_scroll.saturating_sub(1),
                },
                _ => {
                    app.command.input(key);
                }
            }
        }
    }
}

mod ui {
    use super::*;
    use ratatui::{
        layout::{Constraint, Direction, Layout},
        style::{Color, Style},
        text::{Line, Span},
        widgets::{Block, Borders, Paragraph},
        Frame,
    };

    fn format_value(format: NumFormat, value: i32) -> String {
        match format {
            NumFormat::Hex => format!("0x{:08x}", value),
            NumFormat::Binary => format!("0b{:032b}", value),
            NumFormat::Decimal => format!("{:<11}", value),
        }
    }

    fn pane_style<S: ProgramSource>(app: &App<S>, pane: Pane) -> Style {
        if app.active_pane == pane { Style::default().fg(Color::Yellow) } else { Style::default() }
    }

    pub fn draw<S: ProgramSource>(f: &mut Frame, app: &mut App<S>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
            Constraint::Length(3),  // Top bar
            Constraint::Min(10),    // Registers and memory
            Constraint::Length(10), // Logs
            Constraint::Length(3),  // Command line
            ])
            .split(f.area());

        // Top bar
        let machine = app.session.machine();
        let breakpoint = app.session.breakpoint().map_or("none".to_string(), |addr| addr.to_string());
        let top_msg = Paragraph::new(format!(
            "State: {:?} | IP: {:03} | Breakpoint: {} | Format (F9): {:?} | Pane (Tab): {:?} | Press ESC to quit",
            app.mode(), machine.ip(), breakpoint, app.number_format, app.active_pane
        ))
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(top_msg, chunks[0]);

        let middle_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(35), // Registers
                Constraint::Percentage(65), // Memory
            ])
            .split(chunks[1]);

        // Registers
        let mut reg_str = String::new();
        for (i, value) in machine.registers().iter().enumerate() {
            reg_str.push_str(&format!("{:<3}: {}\n", config::register_name(i), format_value(app.number_format, *value)));
        }
        let regs_p = Paragraph::new(reg_str)
            .scroll((app.registers_scroll, 0))
            .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(pane_style(app, Pane::Registers))
                .title("Registers"),
        );
        f.render_widget(regs_p, middle_chunks[0]);

        // Memory, with IP, SP and FP highlighted
        let registers = machine.registers();
        let mut mem_lines: Vec<Line> = Vec::new();
        for (addr, value) in machine.memory().iter().enumerate().skip(app.memory_scroll as usize) {
            let formatted = format!("{:03}: {}", addr, format_value(app.number_format, *value));
            let addr = addr as i32;
            let style = if addr == registers[config::IP] {
                Some(Style::default().bg(Color::DarkGray).fg(Color::Green))
            } else if addr == registers[config::SP] {
                Some(Style::default().fg(Color::Cyan))
            } else if addr == registers[config::FP] {
                Some(Style::default().fg(Color::Magenta))
            } else {
                None
            };
            match style {
                Some(style) => mem_lines.push(Line::from(vec![Span::styled(formatted, style)])),
                None => mem_lines.push(Line::from(formatted)),
            }
        }
        let mem_p = Paragraph::new(mem_lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(pane_style(app, Pane::Memory))
                .title("Memory (IP green, SP cyan, FP magenta)"),
        );
        f.render_widget(mem_p, middle_chunks[1]);

        // Logs, pinned to the newest lines unless scrolled back
        let visible = chunks[2].height.saturating_sub(2) as usize;
        let end = app.logs.len().saturating_sub(app.logs_scroll as usize);
        let start = end.saturating_sub(visible);
        let logs_text = app.logs[start..end].join("\n");
        let logs = Paragraph::new(logs_text).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(pane_style(app, Pane::Logs))
                .title("Execution Logs"),
        );
        f.render_widget(logs, chunks[2]);

        // Command line
        let title = match app.mode() {
            RunMode::Paused => format!("{} (Enter: run command, F10: step, F5: continue)", app.session.prompt().trim_end()),
            RunMode::Running => "Running...".to_string(),
            RunMode::Finished => "Finished (Esc to quit)".to_string(),
        };
        app.command.set_block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(&app.command, chunks[3]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::TextSource;
    use ratatui::backend::TestBackend;

    fn app(text: &str) -> App<'static, TextSource> {
        let session = Session::new(TextSource::new("tui.vml", text), true).unwrap();
        App::new(session)
    }

    #[test]
    fn test_starts_paused() {
        let app = app("6 1 7 1 9 1 10");
        assert_eq!(app.mode(), RunMode::Paused);
        assert_eq!(app.logs, vec!["Loaded tui.vml".to_string()]);
    }

    #[test]
    fn test_step_commands_collect_output() {
        let mut app = app("6 1 7 1 9 1 10");
        app.submit("step");
        app.submit("step");
        assert!(app.logs.contains(&"dbg[000]> step".to_string()));
        assert!(app.logs.contains(&"out: 7".to_string()));
        assert_eq!(app.session.machine().ip(), 5);
    }

    #[test]
    fn test_continue_runs_to_halt() {
        let mut app = app("6 1 7 1 9 1 10");
        app.submit("continue");
        assert_eq!(app.mode(), RunMode::Running);
        app.run_batch();
        assert_eq!(app.mode(), RunMode::Finished);
        assert!(app.logs.contains(&"out: 7".to_string()));
        assert!(app.logs.contains(&"Program halted".to_string()));
    }

    #[test]
    fn test_breakpoint_pauses_batch() {
        let mut app = app("6 1 7 1 9 1 10");
        app.submit("break 3");
        app.submit("c");
        app.run_batch();
        assert_eq!(app.mode(), RunMode::Paused);
        assert!(app.logs.contains(&"Hit breakpoint at 3".to_string()));
    }

    // MOVI 1 r2; ADD r2 r1 (four times); HALT
    const COUNTER: &str = "16 1 1 2 3 2 1 3 2 1 3 2 1 3 2 1 10";

    #[test]
    fn test_step_count_drains_in_batch() {
        let mut app = app(COUNTER);
        app.submit("step 5");
        assert_eq!(app.mode(), RunMode::Running);
        app.run_batch();
        assert_eq!(app.mode(), RunMode::Paused);
        assert_eq!(app.session.machine().ip(), 15);
        assert_eq!(app.session.machine().registers()[1], 4);
    }

    #[test]
    fn test_breakpoint_after_step_count() {
        let mut app = app(COUNTER);
        app.submit("break 9");
        app.submit("step 2");
        app.run_batch();
        assert_eq!(app.session.machine().ip(), 6);
        assert_eq!(app.mode(), RunMode::Paused);

        app.submit("continue");
        app.run_batch();
        assert_eq!(app.mode(), RunMode::Paused);
        assert_eq!(app.session.machine().ip(), 9);
        assert!(app.logs.contains(&"Hit breakpoint at 9".to_string()));
        assert!(!app.logs.contains(&"Program halted".to_string()));
    }

    #[test]
    fn test_quit_command() {
        let mut app = app("1 10");
        app.submit("quit");
        assert!(app.should_quit);
    }

    #[test]
    fn test_draw() {
        let mut app = app("6 1 7 1 9 1 10");
        app.submit("step");
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|f| ui::draw(f, &mut app)).unwrap();

        let buffer = terminal.backend().buffer();
        let screen: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(screen.contains("IP: 003"));
        assert!(screen.contains("Registers"));
        assert!(screen.contains("000: 1"));
    }
}
