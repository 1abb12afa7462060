use crate::isolation::IsolateChild;

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Status {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Runs the configured command against a downloaded file.
pub struct Executor {
    command: String,
    args_template: String,
}

impl Executor {
    pub fn new(command: String, args_template: String) -> Self {
        Self {
            command,
            args_template,
        }
    }

    pub fn build_command(&self, file_path: &Path) -> Command {
        let mut cmd = Command::new(&self.command);
        // The formatted template is one argument, never split on whitespace.
        cmd.arg(format_argument(&self.args_template, &file_path.to_string_lossy()))
            .stdin(Stdio::null())
            .isolate_child();
        cmd
    }

    /// Runs the command, prints its stdout and returns it.
    pub fn execute(&self, file_path: &Path) -> Result<String, ExecuteError> {
        let output = self
            .build_command(file_path)
            .output()
            .map_err(|source| ExecuteError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        println!("{}", stdout);

        if !output.status.success() {
            return Err(ExecuteError::Status {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

/// Substitutes `value` for the first `%s` in `template`; `%%` yields a literal `%`.
pub fn format_argument(template: &str, value: &str) -> String {
    let mut out = String::with_capacity(template.len() + value.len());
    let mut chars = template.chars().peekable();
    let mut substituted = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s') if !substituted => {
                chars.next();
                out.push_str(value);
                substituted = true;
            }
            _ => out.push('%'),
        }
    }
    out
}
