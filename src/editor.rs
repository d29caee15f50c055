//! Interactive single-line editor with history recall.
//!
//! The editor reads raw keystrokes one byte at a time and keeps the terminal
//! line in sync with its buffer by echoing every accepted key itself.

use crate::history::{History, Recall};
use crate::terminal::RawMode;
use log::debug;
use std::io::{self, IsTerminal, Read, Stdin, Stdout, Write};
use std::os::fd::AsFd;

const ENTER: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';
const INTERRUPT: u8 = 0x03;
const END_OF_TRANSMISSION: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const ESCAPE: u8 = 0x1b;
const DELETE: u8 = 0x7f;

/// A decoded keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    /// A byte that belongs in the buffer.
    Byte(u8),
    Enter,
    Backspace,
    Interrupt,
    /// Ctrl-D: ends input when the buffer is empty.
    EndOfTransmission,
    Up,
    Down,
    /// The keystroke stream is exhausted.
    Eof,
    /// Unrecognized control byte or escape sequence.
    Ignored,
}

/// Line editor bound to an input byte stream and a display.
///
/// Each call to [`LineEditor::read_line`] is one editing session: it prints the
/// prompt, collects keys until Enter or Ctrl-C, and returns the line.
///
/// `T` is the terminal put into raw mode for the duration of a session. An
/// editor without one reads its input as is.
pub struct LineEditor<R, W, T = Stdin> {
    input: R,
    output: W,
    prompt: String,
    capacity: usize,
    terminal: Option<T>,
}

impl LineEditor<Stdin, Stdout> {
    /// Editor on the process' standard streams.
    ///
    /// Raw mode is switched on for each session only if stdin is a terminal.
    pub fn stdio(prompt: impl Into<String>, capacity: usize) -> Self {
        let stdin = io::stdin();
        let terminal = stdin.is_terminal().then(io::stdin);
        let mut editor = Self::new(stdin, io::stdout(), prompt, capacity);
        editor.terminal = terminal;
        editor
    }
}

impl<R: Read, W: Write> LineEditor<R, W> {
    pub fn new(input: R, output: W, prompt: impl Into<String>, capacity: usize) -> Self {
        Self {
            input,
            output,
            prompt: prompt.into(),
            capacity,
            terminal: None,
        }
    }
}

impl<R: Read, W: Write, T: AsFd> LineEditor<R, W, T> {
    /// Switch `tty` to raw mode while a session runs.
    pub fn with_terminal<U: AsFd>(self, tty: U) -> LineEditor<R, W, U> {
        LineEditor {
            input: self.input,
            output: self.output,
            prompt: self.prompt,
            capacity: self.capacity,
            terminal: Some(tty),
        }
    }

    /// The display the editor draws on.
    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    /// Run one editing session.
    ///
    /// Returns `Ok(None)` once input is exhausted. Ctrl-C, or an interrupt signal
    /// arriving while waiting for a key, submits an empty line. The terminal
    /// mode is restored however the session ends.
    pub fn read_line(&mut self, history: &mut History) -> io::Result<Option<String>> {
        history.begin_session();
        let tty = self.terminal.take();
        let result = match tty.as_ref().map(|t| RawMode::enable(t.as_fd())).transpose() {
            Ok(_raw) => self.edit(history),
            Err(e) => Err(io::Error::from(e)),
        };
        self.terminal = tty;
        result
    }

    fn edit(&mut self, history: &mut History) -> io::Result<Option<String>> {
        let mut buffer: Vec<u8> = Vec::with_capacity(self.capacity);
        // Continuation bytes still owed by a character that did not fit.
        let mut rejected = 0;
        self.output.write_all(self.prompt.as_bytes())?;
        self.output.flush()?;

        loop {
            match self.next_key()? {
                Key::Byte(byte) if is_continuation(byte) && rejected > 0 => rejected -= 1,
                Key::Byte(byte) => {
                    rejected = 0;
                    let width = if is_continuation(byte) { 1 } else { char_width(byte) };
                    if buffer.len() + width <= self.capacity {
                        buffer.push(byte);
                        self.output.write_all(&[byte])?;
                    } else {
                        rejected = width - 1;
                    }
                }
                Key::Enter => {
                    self.output.write_all(b"\n")?;
                    break;
                }
                Key::Interrupt => {
                    debug!("edit session interrupted, submitting empty line");
                    buffer.clear();
                    self.output.write_all(b"^C\n")?;
                    break;
                }
                Key::Backspace => {
                    if pop_char(&mut buffer) {
                        self.output.write_all(b"\x08 \x08")?;
                    }
                }
                Key::Up => {
                    if let Some(line) = history.recall_older() {
                        buffer = line.as_bytes().to_vec();
                        self.redraw(&buffer)?;
                    }
                }
                Key::Down => match history.recall_newer() {
                    Some(Recall::Entry(line)) => {
                        buffer = line.as_bytes().to_vec();
                        self.redraw(&buffer)?;
                    }
                    Some(Recall::Blank) => {
                        buffer.clear();
                        self.redraw(&buffer)?;
                    }
                    None => {}
                },
                Key::EndOfTransmission if buffer.is_empty() => {
                    self.output.write_all(b"\n")?;
                    self.output.flush()?;
                    return Ok(None);
                }
                Key::Eof => {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    self.output.write_all(b"\n")?;
                    break;
                }
                Key::EndOfTransmission | Key::Ignored => {}
            }
            self.output.flush()?;
        }

        self.output.flush()?;
        Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
    }

    fn redraw(&mut self, buffer: &[u8]) -> io::Result<()> {
        self.output.write_all(b"\r")?;
        self.output.write_all(self.prompt.as_bytes())?;
        self.output.write_all(buffer)?;
        // Erase whatever a longer previous line left behind.
        self.output.write_all(b"\x1b[K")
    }

    fn next_key(&mut self) -> io::Result<Key> {
        let byte = match self.read_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => return Ok(Key::Eof),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Key::Interrupt),
            Err(e) => return Err(e),
        };
        let key = match byte {
            ENTER | CARRIAGE_RETURN => Key::Enter,
            INTERRUPT => Key::Interrupt,
            END_OF_TRANSMISSION => Key::EndOfTransmission,
            BACKSPACE | DELETE => Key::Backspace,
            ESCAPE => self.escape_sequence()?,
            byte if byte < 0x20 => Key::Ignored,
            byte => Key::Byte(byte),
        };
        Ok(key)
    }

    /// Decode the rest of `ESC [ x` / `ESC O x`.
    fn escape_sequence(&mut self) -> io::Result<Key> {
        let marker = match self.read_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => return Ok(Key::Ignored),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Key::Interrupt),
            Err(e) => return Err(e),
        };
        if marker != b'[' && marker != b'O' {
            return Ok(Key::Ignored);
        }
        let key = match self.read_byte() {
            Ok(Some(b'A')) => Key::Up,
            Ok(Some(b'B')) => Key::Down,
            Ok(_) => Key::Ignored,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Key::Interrupt,
            Err(e) => return Err(e),
        };
        Ok(key)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.input.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xc0 == 0x80
}

/// Length of the UTF-8 sequence introduced by `lead`.
fn char_width(lead: u8) -> usize {
    match lead.leading_ones() {
        2 => 2,
        3 => 3,
        4 => 4,
        _ => 1,
    }
}

/// Remove the last UTF-8 character from `buffer`. Returns false if it was empty.
fn pop_char(buffer: &mut Vec<u8>) -> bool {
    while let Some(&last) = buffer.last() {
        buffer.pop();
        // Stop after the leading byte.
        if !is_continuation(last) {
            return true;
        }
    }
    false
}
