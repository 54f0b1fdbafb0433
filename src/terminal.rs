//! Terminal handling: raw mode, keystroke input and output translation.
//!
//! Raw mode is held by `TerminalGuard` for exactly as long as the guard
//! lives. The panic hook and the signal watcher make sure the previous mode
//! comes back on every exit path, not just a normal return.

use std::io::{self, Write};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::runtime::Handle;
use tracing::info;

use crate::tokenizer::{CharSource, InputError};

/// Global flag to track if terminal is in raw mode (for panic cleanup)
static TERMINAL_RAW: AtomicBool = AtomicBool::new(false);

/// How often a blocked key read checks the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// RAII guard for terminal state management.
/// Ensures terminal is restored to normal state when dropped, even on panic or early return.
pub struct TerminalGuard {
    active: bool,
}

impl TerminalGuard {
    /// Put the terminal into raw mode: keys arrive one at a time, unechoed.
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        TERMINAL_RAW.store(true, Ordering::SeqCst);
        Ok(Self { active: true })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = disable_raw_mode();
            TERMINAL_RAW.store(false, Ordering::SeqCst);
            self.active = false;
        }
    }
}

/// Install a panic hook that restores terminal state before printing panic info.
pub fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // Only cleanup if terminal was put in raw mode
        if TERMINAL_RAW.load(Ordering::SeqCst) {
            // Best effort cleanup - ignore errors
            let _ = disable_raw_mode();
            let _ = io::stdout().flush();
        }
        // Call the default panic handler
        default_hook(panic_info);
    }));
}

// =============================================================================
// Keystroke Input
// =============================================================================

/// Reads keystrokes through crossterm while the terminal is in raw mode.
pub struct CrosstermInput {
    shutdown: Arc<AtomicBool>,
}

impl CrosstermInput {
    /// `shutdown` is checked between polls; once set, reads report
    /// `InputError::Interrupted`.
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self { shutdown }
    }
}

impl CharSource for CrosstermInput {
    fn read_char(&mut self) -> Result<char, InputError> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(InputError::Interrupted);
            }
            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                if let Some(result) = key_to_input(key) {
                    return result;
                }
            }
        }
    }
}

/// Wraps a non-terminal character source so a termination signal ends the
/// session at the next character instead of killing the process.
pub struct Interruptible<S> {
    inner: S,
    shutdown: Arc<AtomicBool>,
}

impl<S> Interruptible<S> {
    pub fn new(inner: S, shutdown: Arc<AtomicBool>) -> Self {
        Self { inner, shutdown }
    }
}

impl<S: CharSource> CharSource for Interruptible<S> {
    fn read_char(&mut self) -> Result<char, InputError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(InputError::Interrupted);
        }
        self.inner.read_char()
    }
}

/// Translate a key event into tokenizer input.
///
/// Returns `None` for keys the tokenizer does not care about (arrows,
/// function keys, key releases).
pub fn key_to_input(key: KeyEvent) -> Option<Result<char, InputError>> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Err(InputError::Interrupted)),
        (KeyCode::Char('d'), KeyModifiers::CONTROL) => Some(Err(InputError::Closed)),
        (KeyCode::Char(c), modifiers)
            if !modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            Some(Ok(c))
        }
        (KeyCode::Enter, _) => Some(Ok('\n')),
        _ => None,
    }
}

// =============================================================================
// Output
// =============================================================================

/// Writer that turns `\n` into `\r\n`.
///
/// Raw mode switches off the terminal's own newline translation.
pub struct RawModeWriter<W> {
    inner: W,
}

impl<W: Write> RawModeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for RawModeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// =============================================================================
// Signals
// =============================================================================

/// Set `shutdown` when the process receives a termination signal.
///
/// Replaces the default "die immediately" behaviour so the interactive loop
/// can restore the terminal and stop the engine first.
#[cfg(unix)]
pub fn watch_shutdown_signals(runtime: &Handle, shutdown: Arc<AtomicBool>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let _context = runtime.enter();
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    runtime.spawn(async move {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = hangup.recv() => "SIGHUP",
            _ = interrupt.recv() => "SIGINT",
        };
        info!("Received {}, shutting down", name);
        shutdown.store(true, Ordering::SeqCst);
    });

    Ok(())
}

#[cfg(not(unix))]
pub fn watch_shutdown_signals(runtime: &Handle, shutdown: Arc<AtomicBool>) -> io::Result<()> {
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_printable_keys_pass_through() {
        for c in ['1', '.', '+', '_', 'q', 'π'] {
            let result = key_to_input(press(KeyCode::Char(c), KeyModifiers::NONE));
            assert!(matches!(result, Some(Ok(got)) if got == c));
        }
    }

    #[test]
    fn test_shifted_keys_pass_through() {
        let result = key_to_input(press(KeyCode::Char('^'), KeyModifiers::SHIFT));
        assert!(matches!(result, Some(Ok('^'))));
    }

    #[test]
    fn test_enter_is_newline() {
        let result = key_to_input(press(KeyCode::Enter, KeyModifiers::NONE));
        assert!(matches!(result, Some(Ok('\n'))));
    }

    #[test]
    fn test_ctrl_c_interrupts() {
        let result = key_to_input(press(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(matches!(result, Some(Err(InputError::Interrupted))));
    }

    #[test]
    fn test_ctrl_d_closes() {
        let result = key_to_input(press(KeyCode::Char('d'), KeyModifiers::CONTROL));
        assert!(matches!(result, Some(Err(InputError::Closed))));
    }

    #[test]
    fn test_other_keys_are_ignored() {
        assert!(key_to_input(press(KeyCode::Left, KeyModifiers::NONE)).is_none());
        assert!(key_to_input(press(KeyCode::F(1), KeyModifiers::NONE)).is_none());
        assert!(key_to_input(press(KeyCode::Char('x'), KeyModifiers::ALT)).is_none());
    }

    #[test]
    fn test_key_release_is_ignored() {
        let release = KeyEvent::new_with_kind_and_state(
            KeyCode::Char('1'),
            KeyModifiers::NONE,
            KeyEventKind::Release,
            KeyEventState::NONE,
        );
        assert!(key_to_input(release).is_none());
    }

    #[test]
    fn test_shutdown_flag_interrupts_read() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut input = CrosstermInput::new(flag);
        assert!(matches!(input.read_char(), Err(InputError::Interrupted)));
    }

    #[test]
    fn test_interruptible_stops_piped_input_after_signal() {
        let flag = Arc::new(AtomicBool::new(false));
        let reader = crate::tokenizer::ReaderInput::new(std::io::Cursor::new(b"12".to_vec()));
        let mut input = Interruptible::new(reader, Arc::clone(&flag));

        assert!(matches!(input.read_char(), Ok('1')));
        flag.store(true, Ordering::SeqCst);
        assert!(matches!(input.read_char(), Err(InputError::Interrupted)));
    }

    #[test]
    fn test_raw_mode_writer_translates_newlines() {
        let mut writer = RawModeWriter::new(Vec::new());
        writer.write_all(b"12+\n3,4\n\nend").unwrap();
        assert_eq!(writer.inner, b"12+\r\n3,4\r\n\r\nend");
    }

    #[test]
    fn test_raw_mode_writer_reports_full_length() {
        let mut writer = RawModeWriter::new(Vec::new());
        assert_eq!(writer.write(b"a\nb").unwrap(), 3);
    }
}
