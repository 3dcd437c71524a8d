use std::fmt;

use crate::api_client::Resource;

/// A line typed at the console prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Go(String),
    Login { email: String, password: String },
    Logout,
    Status,
    Reload,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Unknown(String),
    MissingArgument(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Unknown(word) => write!(f, "unknown command '{}', try 'help'", word),
            CommandError::MissingArgument(usage) => write!(f, "usage: {}", usage),
        }
    }
}

impl std::error::Error for CommandError {}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    ///
    /// A bare section name (`players`) or route (`/players`) is shorthand
    /// for `go`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };

        let command = match head {
            "go" | "open" => {
                let path = words.next().ok_or(CommandError::MissingArgument("go <path>"))?;
                Command::Go(as_route(path))
            }
            "login" => {
                let usage = "login <email> <password>";
                let email = words.next().ok_or(CommandError::MissingArgument(usage))?;
                let password = words.next().ok_or(CommandError::MissingArgument(usage))?;
                Command::Login {
                    email: email.to_string(),
                    password: password.to_string(),
                }
            }
            "logout" => Command::Logout,
            "status" | "whoami" => Command::Status,
            "reload" | "refresh" => Command::Reload,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "home" => Command::Go("/".to_string()),
            route if route.starts_with('/') => Command::Go(route.to_string()),
            other => match Resource::from_route(other) {
                Some(resource) => Command::Go(format!("/{}", resource.segment())),
                None => return Err(CommandError::Unknown(other.to_string())),
            },
        };

        Ok(Some(command))
    }
}

fn as_route(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
