//! Interactive prompts.

use crate::CliResult;
use std::io::{BufRead, Write};

/// Asks the user questions on the terminal.
pub trait Prompter {
    /// Yes/no question; anything but `y`/`yes` is a no.
    fn confirm(&self, question: &str) -> CliResult<bool>;
    /// Free-form answer, falling back to `default` on an empty reply.
    fn ask(&self, question: &str, default: Option<&str>) -> CliResult<String>;
    /// Answer that should not be logged.
    fn secret(&self, question: &str) -> CliResult<String>;
}

/// Prompter reading from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter {
    assume_yes: bool,
}

impl StdinPrompter {
    /// Create a prompter; `assume_yes` answers every confirmation with yes.
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    fn read_line(prompt: &str) -> CliResult<String> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err("stdin closed while waiting for input".into());
        }
        Ok(line.trim().to_string())
    }
}

impl Prompter for StdinPrompter {
    fn confirm(&self, question: &str) -> CliResult<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        let answer = Self::read_line(&format!("{question} [y/N]: "))?;
        Ok(is_yes(&answer))
    }

    fn ask(&self, question: &str, default: Option<&str>) -> CliResult<String> {
        let prompt = match default {
            Some(default) => format!("{question} [{default}]: "),
            None => format!("{question}: "),
        };
        let answer = Self::read_line(&prompt)?;
        match (answer.is_empty(), default) {
            (true, Some(default)) => Ok(default.to_string()),
            (true, None) => Err(format!("{question} is required").into()),
            (false, _) => Ok(answer),
        }
    }

    fn secret(&self, question: &str) -> CliResult<String> {
        let answer = Self::read_line(&format!("{question}: "))?;
        if answer.is_empty() {
            return Err(format!("{question} is required").into());
        }
        Ok(answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
