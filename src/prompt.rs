//! Interactive input.
//!
//! Commands ask questions through [`Prompter`] so the confirmation gates and
//! the interactive `add` flow can be driven by scripted answers in tests.

use anyhow::{Context, Result};
use inquire::{Password, PasswordDisplayMode, Select, Text};

pub trait Prompter {
    /// Free-form line of text.
    fn text(&self, message: &str) -> Result<String>;

    /// Secret entered twice; the two entries must match.
    fn new_password(&self, message: &str) -> Result<String>;

    /// Pick one of `options`, returning its index.
    fn select(&self, message: &str, options: &[String]) -> Result<usize>;
}

/// [`Prompter`] on the terminal, backed by `inquire`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn text(&self, message: &str) -> Result<String> {
        Text::new(message).prompt().context("Input cancelled")
    }

    fn new_password(&self, message: &str) -> Result<String> {
        Password::new(message)
            .with_display_mode(PasswordDisplayMode::Masked)
            .with_custom_confirmation_message("Confirm passphrase:")
            .with_custom_confirmation_error_message("The passphrases don't match.")
            .prompt()
            .context("Passphrase entry cancelled")
    }

    fn select(&self, message: &str, options: &[String]) -> Result<usize> {
        let choice = Select::new(message, options.to_vec())
            .prompt()
            .context("Selection cancelled")?;
        options
            .iter()
            .position(|o| *o == choice)
            .context("Selected option not found")
    }
}
