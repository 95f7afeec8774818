//! Terminal output for sshprof: status labels, tables, spinners.
//!
//! # No-color detection (in priority order):
//! 1. `--no-color` CLI flag (highest priority)
//! 2. `NO_COLOR` environment variable (any value)
//! 3. `TERM=dumb` environment variable
//! 4. Non-TTY stdout (detected via anstream)
//!
//! Results go to stdout; warnings and errors go to stderr so that
//! `sshprof completions` and `sshprof list` stay pipeable.

use anstream::{eprintln, println};
use anstyle::{AnsiColor, Color, Style};
use clap::ValueEnum;
use comfy_table::{Cell, ContentArrangement, Table, presets};
use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::fmt::Display;
use std::io::IsTerminal;
use std::time::Duration;

/// Color mode for output
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always emit ANSI colors
    Always,
    /// Emit colors only if TTY and not disabled
    #[default]
    Auto,
    /// Never emit ANSI colors
    Never,
}

/// Status glyphs, with ASCII fallbacks when color is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Ok,
    Warn,
    Err,
    Info,
}

impl Icon {
    fn glyph(self, fancy: bool) -> &'static str {
        match (self, fancy) {
            (Icon::Ok, true) => "✓",
            (Icon::Ok, false) => "[OK]",
            (Icon::Warn, true) => "⚠",
            (Icon::Warn, false) => "[!]",
            (Icon::Err, true) => "✗",
            (Icon::Err, false) => "[X]",
            (Icon::Info, true) => "•",
            (Icon::Info, false) => "-",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Out,
    Err,
}

/// UI context holding resolved display settings
#[derive(Debug, Clone)]
pub struct Ui {
    pub color_enabled: bool,
    /// Spinners need color and an interactive stderr.
    pub spinner_enabled: bool,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new(ColorMode::Auto, false)
    }
}

impl Ui {
    pub fn new(mode: ColorMode, force_no_color: bool) -> Self {
        let color_enabled = Self::resolve_color(mode, force_no_color);
        let spinner_enabled = color_enabled && std::io::stderr().is_terminal();

        if !color_enabled {
            anstream::ColorChoice::write_global(anstream::ColorChoice::Never);
        }

        Self {
            color_enabled,
            spinner_enabled,
        }
    }

    fn resolve_color(mode: ColorMode, force_no_color: bool) -> bool {
        if force_no_color
            || std::env::var_os("NO_COLOR").is_some()
            || std::env::var("TERM").is_ok_and(|t| t == "dumb")
        {
            return false;
        }

        match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => std::io::stdout().is_terminal(),
        }
    }

    fn label(&self, stream: Stream, text: &str, color: AnsiColor, msg: &str) {
        let style = if self.color_enabled {
            Style::new().fg_color(Some(Color::Ansi(color))).bold()
        } else {
            Style::new()
        };
        match stream {
            Stream::Out => println!("{style}{text}{style:#} {msg}"),
            Stream::Err => eprintln!("{style}{text}{style:#} {msg}"),
        }
    }

    pub fn ok(&self, msg: impl AsRef<str>) {
        self.label(Stream::Out, "OK", AnsiColor::Green, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.label(Stream::Err, "WARN", AnsiColor::Yellow, msg.as_ref());
    }

    /// One WARN line per item; used for best-effort failures collected in reports.
    pub fn warn_each<I>(&self, items: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        for item in items {
            self.warn(item.to_string());
        }
    }

    pub fn err(&self, msg: impl AsRef<str>) {
        self.label(Stream::Err, "ERROR", AnsiColor::Red, msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.label(Stream::Out, "INFO", AnsiColor::Cyan, msg.as_ref());
    }

    pub fn dim(&self, s: impl AsRef<str>) -> String {
        self.colored(s, AnsiColor::BrightBlack)
    }

    pub fn bold(&self, s: impl AsRef<str>) -> String {
        self.paint(s.as_ref(), Style::new().bold())
    }

    pub fn colored(&self, s: impl AsRef<str>, color: AnsiColor) -> String {
        self.paint(s.as_ref(), Style::new().fg_color(Some(Color::Ansi(color))))
    }

    fn paint(&self, s: &str, style: Style) -> String {
        if self.color_enabled {
            format!("{style}{s}{style:#}")
        } else {
            s.to_string()
        }
    }

    pub fn icon(&self, icon: Icon) -> &'static str {
        icon.glyph(self.color_enabled)
    }

    /// `  <icon> <msg>`, the indented check line used by `doctor` and `add`.
    pub fn item(&self, icon: Icon, msg: impl AsRef<str>) {
        println!("  {} {}", self.icon(icon), msg.as_ref());
    }

    /// Borderless table for lists
    pub fn simple_table(&self) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.load_preset(presets::NOTHING);
        table
    }

    pub fn cell(&self, content: impl Into<String>) -> Cell {
        Cell::new(content.into())
    }

    pub fn header_cell(&self, content: impl Into<String>) -> Cell {
        let cell = Cell::new(content.into());
        if self.color_enabled {
            cell.add_attribute(comfy_table::Attribute::Bold)
        } else {
            cell
        }
    }

    /// Colored cell using comfy-table's own styling, so column widths stay right
    pub fn colored_cell(&self, content: impl Into<String>, color: comfy_table::Color) -> Cell {
        let cell = Cell::new(content.into());
        if self.color_enabled { cell.fg(color) } else { cell }
    }

    /// Spinner on stderr while an external tool runs; hidden when disabled.
    pub fn spinner(&self, message: impl Into<Cow<'static, str>>) -> ProgressBar {
        if !self.spinner_enabled {
            let pb = ProgressBar::hidden();
            pb.set_message(message);
            return pb;
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    pub fn spinner_finish_ok(&self, pb: &ProgressBar, msg: impl AsRef<str>) {
        pb.finish_and_clear();
        self.ok(msg);
    }

    pub fn spinner_finish_err(&self, pb: &ProgressBar, msg: impl AsRef<str>) {
        pb.finish_and_clear();
        self.err(msg);
    }

    pub fn println(&self, msg: impl AsRef<str>) {
        println!("{}", msg.as_ref());
    }

    pub fn newline(&self) {
        println!();
    }

    pub fn section(&self, title: impl AsRef<str>) {
        println!("{}", self.bold(title));
    }
}
