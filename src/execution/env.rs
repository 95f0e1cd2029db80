//! Environment injection for background jobs.
//!
//! A background job learns its correlation token through an environment
//! variable prepended to its command. The assignment is rendered for the
//! shell the command will run under, with the value quoted so it cannot
//! break out of the assignment.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Name of the variable carrying the correlation token.
pub const TASK_ID_VAR: &str = "JOBWARDEN_TASK_ID";

/// Errors from [`format_env_assignment`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// The variable name is not `[A-Za-z_][A-Za-z0-9_]*`.
    #[error("invalid environment variable name '{0}'")]
    InvalidName(String),

    /// The value contains a character the shell cannot carry in an assignment.
    #[error("environment value for '{0}' contains a line break or NUL")]
    InvalidValue(String),
}

/// Shell a command is interpreted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellDialect {
    /// POSIX `sh` and compatible shells.
    Posix,
    /// Windows `cmd.exe`.
    WindowsCmd,
}

impl ShellDialect {
    /// Dialect of the shell on this machine.
    pub fn native() -> Self {
        if cfg!(windows) {
            ShellDialect::WindowsCmd
        } else {
            ShellDialect::Posix
        }
    }
}

impl fmt::Display for ShellDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellDialect::Posix => f.write_str("posix"),
            ShellDialect::WindowsCmd => f.write_str("cmd"),
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render `name=value` as a command prefix for `dialect`.
///
/// POSIX output looks like `export NAME='value'; ` and cmd output like
/// `set NAME=value&& `, so the result can be concatenated with the command.
pub fn format_env_assignment(
    name: &str,
    value: &str,
    dialect: ShellDialect,
) -> Result<String, EnvError> {
    if !is_valid_name(name) {
        return Err(EnvError::InvalidName(name.to_string()));
    }
    if value.contains(['\n', '\r', '\0']) {
        return Err(EnvError::InvalidValue(name.to_string()));
    }

    let rendered = match dialect {
        ShellDialect::Posix => {
            let quoted = value.replace('\'', r"'\''");
            format!("export {name}='{quoted}'; ")
        }
        ShellDialect::WindowsCmd => {
            let mut escaped = String::with_capacity(value.len());
            for c in value.chars() {
                match c {
                    '%' => escaped.push_str("%%"),
                    '^' | '&' | '|' | '<' | '>' | '(' | ')' | '"' => {
                        escaped.push('^');
                        escaped.push(c);
                    }
                    _ => escaped.push(c),
                }
            }
            format!("set {name}={escaped}&& ")
        }
    };
    Ok(rendered)
}

/// Generate an unpredictable correlation token: 32 lowercase hex chars.
pub fn correlation_token() -> String {
    Uuid::new_v4().simple().to_string()
}
