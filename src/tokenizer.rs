//! Keystroke tokenizer.
//!
//! Reads characters one at a time and decides when the user has finished a
//! token. A token ends either when a delimiter key is typed or when the text
//! typed so far is exactly a command name:
//!
//! ```text
//! input      operand   trigger
//! "12+"      "12"      '+'
//! "\n"       ""        '\n'
//! "sqrt"     ""        "sqrt"
//! ```
//!
//! The terminal does not echo keystrokes in raw mode, so the tokenizer echoes
//! every character itself as soon as it is read.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::commands::Trigger;

/// Errors that end a token read before a token is produced.
#[derive(Debug, Error)]
pub enum InputError {
    /// The user pressed Ctrl-C, or a shutdown was requested while waiting.
    #[error("Input interrupted")]
    Interrupted,

    /// The input stream ended (Ctrl-D or end of file).
    #[error("Input closed")]
    Closed,

    /// Reading a key or echoing it failed.
    #[error("Terminal I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A source of single characters.
///
/// Implementations block until a character is available.
pub trait CharSource {
    /// Read exactly one character.
    fn read_char(&mut self) -> Result<char, InputError>;
}

/// One unit of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Text typed before the trigger. Never validated locally.
    pub operand: String,
    /// What ended the token.
    pub trigger: Trigger,
}

/// Read one token from `input`, echoing each character to `echo`.
///
/// The delimiter test runs on the raw character before the accumulated text
/// is compared against `commands`, so a delimiter always wins. When the
/// accumulated text matches a command it is moved into the trigger and the
/// operand is left empty.
///
/// # Errors
///
/// Returns the first error reported by `input`, or `InputError::Io` if the
/// echo cannot be written. Any partially typed text is discarded.
pub fn read_token<S, W>(
    input: &mut S,
    echo: &mut W,
    delimiters: &[char],
    commands: &[&str],
) -> Result<Token, InputError>
where
    S: CharSource + ?Sized,
    W: Write + ?Sized,
{
    let mut operand = String::new();

    let trigger = loop {
        let c = input.read_char()?;

        let mut encoded = [0u8; 4];
        echo.write_all(c.encode_utf8(&mut encoded).as_bytes())?;
        echo.flush()?;

        if delimiters.contains(&c) {
            break Trigger::Delimiter(c);
        }

        operand.push(c);

        if commands.contains(&operand.as_str()) {
            break Trigger::Command(std::mem::take(&mut operand));
        }
    };

    // Close the line the user was typing on
    echo.write_all(b"\n")?;
    echo.flush()?;

    Ok(Token { operand, trigger })
}

// =============================================================================
// Byte Stream Input
// =============================================================================

/// Decodes UTF-8 characters from a byte stream.
///
/// Used when stdin is not a terminal (piped scripts) and by tests.
pub struct ReaderInput<R> {
    reader: R,
}

impl<R: Read> ReaderInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), InputError> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => InputError::Closed,
            _ => InputError::Io(e),
        })
    }
}

impl<R: Read> CharSource for ReaderInput<R> {
    fn read_char(&mut self) -> Result<char, InputError> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf[..1])?;

        let width = utf8_width(buf[0]).ok_or_else(|| invalid_utf8(buf[0]))?;
        if width > 1 {
            self.fill(&mut buf[1..width])?;
        }

        std::str::from_utf8(&buf[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| invalid_utf8(buf[0]))
    }
}

/// Length of the UTF-8 sequence introduced by `first`.
fn utf8_width(first: u8) -> Option<usize> {
    match first {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

fn invalid_utf8(first: u8) -> InputError {
    InputError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Input is not valid UTF-8 (lead byte 0x{:02x})", first),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{COMMANDS, DELIMITERS};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn input(text: &str) -> ReaderInput<Cursor<Vec<u8>>> {
        ReaderInput::new(Cursor::new(text.as_bytes().to_vec()))
    }

    fn read(source: &mut ReaderInput<Cursor<Vec<u8>>>) -> Result<Token, InputError> {
        let mut echo = Vec::new();
        read_token(source, &mut echo, DELIMITERS, COMMANDS)
    }

    fn consumed(source: ReaderInput<Cursor<Vec<u8>>>) -> u64 {
        source.into_inner().position()
    }

    /// Yields scripted results, then reports the input as closed.
    struct Scripted(Vec<Result<char, InputError>>);

    impl CharSource for Scripted {
        fn read_char(&mut self) -> Result<char, InputError> {
            if self.0.is_empty() {
                Err(InputError::Closed)
            } else {
                self.0.remove(0)
            }
        }
    }

    #[test]
    fn test_each_delimiter_ends_token_immediately() {
        for d in DELIMITERS {
            let mut source = input(&format!("{}99", d));
            let token = read(&mut source).unwrap();
            assert_eq!(
                token,
                Token {
                    operand: String::new(),
                    trigger: Trigger::Delimiter(*d),
                }
            );
            assert_eq!(consumed(source), 1, "delimiter {:?} over-read", d);
        }
    }

    #[test]
    fn test_each_command_fires_without_terminator() {
        for name in COMMANDS {
            let mut source = input(&format!("{}7", name));
            let token = read(&mut source).unwrap();
            assert_eq!(
                token,
                Token {
                    operand: String::new(),
                    trigger: Trigger::Command(name.to_string()),
                }
            );
            assert_eq!(consumed(source), name.len() as u64);
        }
    }

    #[test]
    fn test_operand_then_operator() {
        let mut source = input("12+");
        let token = read(&mut source).unwrap();
        assert_eq!(token.operand, "12");
        assert_eq!(token.trigger, Trigger::Delimiter('+'));
    }

    #[test]
    fn test_command_promotion_clears_operand() {
        let mut source = input("dup");
        let token = read(&mut source).unwrap();
        assert_eq!(token.operand, "");
        assert_eq!(token.trigger, Trigger::Command("dup".to_string()));
    }

    #[test]
    fn test_command_after_operand_text_does_not_fire() {
        let mut source = input("3dup\n");
        let token = read(&mut source).unwrap();
        assert_eq!(token.operand, "3dup");
        assert_eq!(token.trigger, Trigger::Delimiter('\n'));
    }

    #[test]
    fn test_delimiter_wins_over_command_match() {
        // '-' would complete "a-" if it were a command; the raw character is
        // tested first.
        let mut echo = Vec::new();
        let mut source = input("a-");
        let token = read_token(&mut source, &mut echo, &['-'], &["a-"]).unwrap();
        assert_eq!(token.operand, "a");
        assert_eq!(token.trigger, Trigger::Delimiter('-'));
    }

    #[test]
    fn test_echo_writes_each_character_then_newline() {
        let mut echo = Vec::new();
        let mut source = input("12+");
        read_token(&mut source, &mut echo, DELIMITERS, COMMANDS).unwrap();
        assert_eq!(String::from_utf8(echo).unwrap(), "12+\n");
    }

    #[test]
    fn test_enter_echo_produces_blank_line() {
        let mut echo = Vec::new();
        let mut source = input("\n");
        read_token(&mut source, &mut echo, DELIMITERS, COMMANDS).unwrap();
        assert_eq!(String::from_utf8(echo).unwrap(), "\n\n");
    }

    #[test]
    fn test_consecutive_tokens_do_not_share_state() {
        let mut source = input("3+4\nswap");
        let first = read(&mut source).unwrap();
        let second = read(&mut source).unwrap();
        let third = read(&mut source).unwrap();
        assert_eq!(first.operand, "3");
        assert_eq!(second.operand, "4");
        assert_eq!(second.trigger, Trigger::Delimiter('\n'));
        assert_eq!(third.trigger, Trigger::Command("swap".to_string()));
    }

    #[test]
    fn test_multibyte_operand() {
        let mut source = input("π\n");
        let token = read(&mut source).unwrap();
        assert_eq!(token.operand, "π");
    }

    #[test]
    fn test_end_of_input_reports_closed() {
        let mut source = input("12");
        assert!(matches!(read(&mut source), Err(InputError::Closed)));
    }

    #[test]
    fn test_truncated_utf8_reports_closed() {
        let mut source = ReaderInput::new(Cursor::new(vec![0xCF]));
        assert!(matches!(source.read_char(), Err(InputError::Closed)));
    }

    #[test]
    fn test_invalid_utf8_reports_io_error() {
        let mut source = ReaderInput::new(Cursor::new(vec![0xFF, b'1']));
        assert!(matches!(source.read_char(), Err(InputError::Io(_))));
    }

    #[test]
    fn test_interrupt_abandons_partial_token() {
        let mut source = Scripted(vec![Ok('4'), Ok('2'), Err(InputError::Interrupted)]);
        let mut echo = Vec::new();
        let result = read_token(&mut source, &mut echo, DELIMITERS, COMMANDS);
        assert!(matches!(result, Err(InputError::Interrupted)));
        assert_eq!(String::from_utf8(echo).unwrap(), "42");
    }
}
