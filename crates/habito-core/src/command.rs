//! Inbound command model.
//!
//! Parsing happens here, framework-free, so the Telegram handler stays a pure
//! mapping from `Command` to store calls.

/// A parsed bot command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Premium,
    Add(String),
    List,
    Check(String),
    Unknown(String),
}

impl Command {
    /// Parse a Telegram message text of the form `/cmd[@botname] [args]`.
    ///
    /// Returns `None` for non-command text.
    pub fn parse(text: &str) -> Option<Command> {
        let trimmed = text.trim();
        if !trimmed.starts_with('/') {
            return None;
        }

        // Telegram may send `/cmd@botname arg1 ...`
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("").trim();
        let rest = parts.next().unwrap_or("").trim();

        let cmd = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        let parsed = match cmd.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "premium" => Command::Premium,
            "add" => Command::Add(rest.to_string()),
            "list" => Command::List,
            "check" => Command::Check(rest.to_string()),
            other => Command::Unknown(other.to_string()),
        };
        Some(parsed)
    }
}
