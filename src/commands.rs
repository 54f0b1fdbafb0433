//! Operator and command tables.
//!
//! The front-end recognises two kinds of token terminators:
//!
//! - **Delimiters**: single characters that end the current token the moment
//!   they are typed (`\n` and the arithmetic operator keys).
//! - **Commands**: canonical engine command names. A token ends as soon as the
//!   typed text is exactly one of them, without any terminating key.
//!
//! Because commands fire on an exact match, the command set must stay
//! prefix-free: if one name were a prefix of another, the longer one could
//! never be typed.

use std::fmt;

/// Characters that terminate a token immediately.
pub const DELIMITERS: &[char] = &['\n', '+', '-', '*', '/', '_', '^'];

/// Command sent when Enter is pressed on an empty operand.
pub const DUP_COMMAND: &str = "dup";

/// Command that asks the engine to end the session.
pub const QUIT_COMMAND: &str = "quit";

/// Canonical command names understood by the engine.
pub const COMMANDS: &[&str] = &[
    // Arithmetic
    "add",
    "subtract",
    "multiply",
    "divide",
    "power",
    "sqrt",
    "mod",
    "abs",
    "round",
    "invert",
    "chs",
    // Trigonometry
    "sin",
    "cos",
    "tan",
    "sec",
    "csc",
    "cot",
    "asin",
    "acos",
    "atan",
    // Logarithms
    "log",
    "blog",
    "ln",
    // Comparisons
    "eq",
    "gt",
    "lt",
    "geq",
    "leq",
    // Stack manipulation
    "drop",
    "swap",
    "dup",
    "rolldown",
    "rollup",
    "clear",
    // Variables
    "store",
    "purge",
    "invstore",
    // History
    "undo",
    "redo",
    // Session
    "refresh",
    "commands",
    "quit",
];

// =============================================================================
// Trigger
// =============================================================================

/// What ended a token: a delimiter key or a fully typed command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A character from [`DELIMITERS`].
    Delimiter(char),
    /// A name from [`COMMANDS`].
    Command(String),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Delimiter('\n') => write!(f, "<enter>"),
            Trigger::Delimiter(c) => write!(f, "{}", c),
            Trigger::Command(name) => write!(f, "{}", name),
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// The outcome of resolving a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Send this command to the engine.
    Command(String),
    /// Nothing to send for this token.
    NoOp,
}

/// Map a trigger to the command that should be dispatched.
///
/// Enter on an empty operand duplicates the top of the stack; Enter after an
/// operand only completes the entry. Operator keys map to their command
/// names, and anything else (already-canonical names included) passes
/// through unchanged.
pub fn resolve(trigger: &Trigger, operand_was_empty: bool) -> Resolution {
    let name = match trigger {
        Trigger::Delimiter('\n') if operand_was_empty => DUP_COMMAND,
        Trigger::Delimiter('\n') => return Resolution::NoOp,
        Trigger::Delimiter('+') => "add",
        Trigger::Delimiter('-') => "subtract",
        Trigger::Delimiter('*') => "multiply",
        Trigger::Delimiter('/') => "divide",
        Trigger::Delimiter('_') => "invert",
        Trigger::Delimiter('^') => "power",
        Trigger::Delimiter(other) => return Resolution::Command(other.to_string()),
        Trigger::Command(name) => name.as_str(),
    };
    Resolution::Command(name.to_string())
}

/// Returns true if `c` ends a token on its own.
pub fn is_delimiter(c: char) -> bool {
    DELIMITERS.contains(&c)
}

/// Returns true if `text` is a canonical command name.
pub fn is_command(text: &str) -> bool {
    COMMANDS.contains(&text)
}
