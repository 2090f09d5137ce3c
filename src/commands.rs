// ABOUTME: Command grammar for chat messages: prefix detection and argument parsing.
// ABOUTME: Produces ParseResult so the router can distinguish commands from plain events.

/// A parsed command invocation from a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Trigger name, without the prefix
    pub trigger: String,
    /// Parsed arguments (quoted strings kept together)
    pub args: Vec<String>,
    /// Raw argument text after the trigger
    pub raw_args: String,
}

impl Command {
    pub fn new(trigger: impl Into<String>, args: Vec<String>, raw_args: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            args,
            raw_args: raw_args.into(),
        }
    }

    /// First argument, if present
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|s| s.as_str())
    }
}

/// Result of classifying a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// Message is a command invocation
    Command(Command),
    /// Regular message, deliver to listeners
    Message(String),
    /// Empty or prefix-only, drop silently
    Ignore,
}

/// Split an argument string, keeping quoted segments together.
fn parse_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '"';

    for c in input.chars() {
        match c {
            '"' | '\'' if !in_quotes => {
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Classify a message body against the command prefix.
///
/// Recognized forms:
/// - `{prefix}trigger args...` - command invocation
/// - `{prefix}{prefix}rest` - escaped, treated as a regular message starting with the prefix
/// - anything else - regular message
///
/// Empty bodies and a bare prefix are ignored.
pub fn parse_message(body: &str, prefix: &str) -> ParseResult {
    let trimmed = body.trim();

    if trimmed.is_empty() {
        return ParseResult::Ignore;
    }

    // Doubled prefix escapes command handling
    let doubled = format!("{prefix}{prefix}");
    if let Some(rest) = trimmed.strip_prefix(&doubled) {
        return ParseResult::Message(format!("{prefix}{rest}"));
    }

    let Some(rest) = trimmed.strip_prefix(prefix) else {
        return ParseResult::Message(trimmed.to_string());
    };

    let rest = rest.trim_start();
    if rest.is_empty() {
        return ParseResult::Ignore;
    }

    let (trigger, raw_args) = match rest.split_once(char::is_whitespace) {
        Some((t, r)) => (t, r.trim()),
        None => (rest, ""),
    };

    ParseResult::Command(Command::new(
        trigger.to_lowercase(),
        parse_args(raw_args),
        raw_args,
    ))
}
