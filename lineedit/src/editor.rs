//! Byte-driven line editor.
//!
//! The editor owns the line buffer, the history and a redisplay snapshot;
//! it consumes raw input bytes and writes VT100 sequences to its sink. It
//! knows nothing about terminals or sockets: raw mode and byte transport
//! belong to the caller, which reacts to the [`EditorEvent`]s the input
//! handler emits.

use std::io::Write;

use crate::history::History;
use crate::line::LineBuffer;
use crate::term::Vt100;
use crate::width::str_width;

const KEY_SOH: u8 = 1; // Ctrl-A
const KEY_ETX: u8 = 3; // Ctrl-C
const KEY_EOT: u8 = 4; // Ctrl-D
const KEY_ENQ: u8 = 5; // Ctrl-E
const KEY_BS: u8 = 8;
const KEY_HT: u8 = 9; // Tab
const KEY_LF: u8 = 10;
const KEY_VT: u8 = 11; // Ctrl-K
const KEY_FF: u8 = 12; // Ctrl-L
const KEY_CR: u8 = 13;
const KEY_NAK: u8 = 21; // Ctrl-U
const KEY_ETB: u8 = 23; // Ctrl-W
const KEY_EM: u8 = 25; // Ctrl-Y
const KEY_ESC: u8 = 27;
const KEY_DEL: u8 = 127;

/// What the caller must act on after feeding input bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// Enter: the finished line.
    Line(String),
    /// Tab: request completion for the current line.
    Completion(String),
    /// `?`: request help for the current line.
    Help(String),
    /// An unbound control byte, offered to the hotkey layer.
    Hotkey(u8),
    /// Ctrl-C: the line was reset locally.
    Interrupt,
    /// Ctrl-D on an empty line.
    Eof,
}

#[derive(Debug, Clone)]
struct Snapshot {
    text: String,
    pos: usize,
}

#[derive(Debug)]
pub struct Editor<W: Write> {
    term: Vt100<W>,
    line: LineBuffer,
    hist: History,
    prompt: String,
    /// Display columns of the prompt's last line.
    prompt_chars: usize,
    width: usize,
    /// Width the last redisplay was rendered at.
    last_width: usize,
    last: Option<Snapshot>,
    /// Escape sequence in progress.
    esc: Option<Vec<u8>>,
    /// Pending bytes of a multibyte UTF-8 character.
    utf8: Vec<u8>,
    utf8_need: usize,
    kill_buf: String,
    /// `?` requests help instead of inserting itself.
    question_help: bool,
    /// Set when an emitted event needs an external round trip; suppresses
    /// redisplay until the caller handles it.
    busy: bool,
}

impl<W: Write> Editor<W> {
    pub fn new(sink: W, history: History) -> Self {
        let mut editor = Self {
            term: Vt100::new(sink),
            line: LineBuffer::new(),
            hist: history,
            prompt: String::new(),
            prompt_chars: 0,
            width: 80,
            last_width: 80,
            last: None,
            esc: None,
            utf8: Vec::new(),
            utf8_need: 0,
            kill_buf: String::new(),
            question_help: true,
            busy: false,
        };
        editor.set_prompt("> ");
        editor
    }

    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = prompt.to_string();
        // A prompt may span lines; only the last one occupies columns.
        let last_line = prompt.rsplit('\n').next().unwrap_or(prompt);
        self.prompt_chars = str_width(last_line);
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_width(&mut self, width: u16) {
        self.width = usize::from(width).max(1);
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn set_question_help(&mut self, on: bool) {
        self.question_help = on;
    }

    pub fn line(&self) -> &str {
        self.line.as_str()
    }

    pub fn history(&self) -> &History {
        &self.hist
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.hist
    }

    /// Insert text at the cursor (completion insertion).
    pub fn insert(&mut self, text: &str) {
        self.line.insert(text);
    }

    /// Replace the whole line.
    pub fn replace_line(&mut self, text: &str) {
        self.line.replace(text);
    }

    /// Forget the rendered snapshot; the next redisplay repaints from the
    /// prompt. Call after writing external output to the sink.
    pub fn reset_line_state(&mut self) {
        self.last = None;
    }

    /// Write raw bytes (remote stdout/stderr) straight to the sink.
    pub fn output(&mut self, bytes: &[u8]) {
        let _ = self.term.sink_mut().write_all(bytes);
        let _ = self.term.sink_mut().flush();
    }

    pub fn ding(&mut self) {
        self.term.ding();
        self.term.flush();
    }

    /// Jump below the (possibly wrapped) current input.
    pub fn multi_crlf(&mut self) {
        let jump = self.last.as_ref().map(|last| {
            let full = str_width(&last.text);
            let pos = str_width(&last.text[..last.pos]);
            (pos, full)
        });
        if let Some((pos, full)) = jump {
            self.move_cursor(
                self.last_width.max(1),
                self.prompt_chars + pos,
                self.prompt_chars + full,
            );
        }
        self.term.next_line();
        self.term.flush();
    }

    /// Feed raw input bytes; returns the events the caller must handle.
    /// The display refreshes after every byte unless a multibyte
    /// character is still incomplete or an event awaits its round trip.
    pub fn input(&mut self, bytes: &[u8]) -> Vec<EditorEvent> {
        self.busy = false;
        let mut events = Vec::new();
        for b in bytes {
            self.input_byte(*b, &mut events);
            if self.utf8_need == 0 && !self.busy {
                self.redisplay();
            }
        }
        events
    }

    fn input_byte(&mut self, byte: u8, events: &mut Vec<EditorEvent>) {
        // Escape sequence in progress.
        if let Some(seq) = &mut self.esc {
            // ANSI control sequences end with a byte in 64..=126 (except
            // the CSI opener itself).
            if seq.len() >= 8 {
                self.esc = None;
                return;
            }
            seq.push(byte);
            if byte != b'[' && (64..=126).contains(&byte) {
                let seq = self.esc.take().unwrap_or_default();
                self.esc_dispatch(&seq);
            }
            return;
        }
        if byte == KEY_ESC {
            self.esc = Some(Vec::new());
            return;
        }

        // Multibyte UTF-8 accumulation.
        if self.utf8_need > 0 {
            if byte & 0xc0 == 0x80 {
                self.utf8.push(byte);
                if self.utf8.len() == self.utf8_need {
                    self.flush_utf8();
                }
            } else {
                // Broken sequence: drop it, reprocess this byte.
                self.utf8.clear();
                self.utf8_need = 0;
                self.input_byte(byte, events);
            }
            return;
        }

        match byte {
            KEY_CR | KEY_LF => self.key_enter(events),
            KEY_ETX => self.key_interrupt(events),
            KEY_DEL | KEY_BS => {
                if !self.line.delete_left() {
                    self.term.ding();
                }
            }
            KEY_EOT => {
                if self.line.is_empty() {
                    self.busy = true;
                    events.push(EditorEvent::Eof);
                } else if !self.line.delete_right() {
                    self.term.ding();
                }
            }
            KEY_FF => {
                self.term.clear_screen();
                self.term.cursor_home();
                self.reset_line_state();
            }
            KEY_NAK => {
                self.line.home();
                self.kill_buf = self.line.kill_to_end();
                self.line.clear();
            }
            KEY_SOH => self.line.home(),
            KEY_ENQ => self.line.end(),
            KEY_VT => self.kill_buf = self.line.kill_to_end(),
            KEY_EM => {
                let text = self.kill_buf.clone();
                self.line.insert(&text);
            }
            KEY_HT => {
                self.busy = true;
                events.push(EditorEvent::Completion(self.line.as_str().to_string()));
            }
            KEY_ETB => self.line.delete_word_left(),
            b'?' if self.question_help => {
                self.busy = true;
                events.push(EditorEvent::Help(self.line.as_str().to_string()));
            }
            b if b > 31 && b < 0x80 => {
                let mut tmp = [0u8; 4];
                let text = (b as char).encode_utf8(&mut tmp);
                self.line.insert(text);
            }
            b if b >= 0xc0 => {
                self.utf8_need = match b {
                    0xc0..=0xdf => 2,
                    0xe0..=0xef => 3,
                    0xf0..=0xf7 => 4,
                    _ => 0, // illegal leading byte, dropped
                };
                if self.utf8_need > 0 {
                    self.utf8.push(b);
                }
            }
            b if b >= 0x80 => {} // stray continuation byte, dropped
            b => events.push(EditorEvent::Hotkey(b)),
        }
    }

    fn flush_utf8(&mut self) {
        let bytes = std::mem::take(&mut self.utf8);
        self.utf8_need = 0;
        if let Ok(text) = std::str::from_utf8(&bytes) {
            self.line.insert(text);
        }
    }

    fn esc_dispatch(&mut self, seq: &[u8]) {
        match seq {
            b"[A" => self.key_up(),
            b"[B" => self.key_down(),
            b"[C" => {
                if !self.line.move_right() {
                    self.term.ding();
                }
            }
            b"[D" => {
                if !self.line.move_left() {
                    self.term.ding();
                }
            }
            b"[H" | b"[1~" => self.line.home(),
            b"[F" | b"[4~" => self.line.end(),
            b"[3~" => {
                if !self.line.delete_right() {
                    self.term.ding();
                }
            }
            // Insert, PgUp, PgDn and anything unknown are ignored.
            _ => {}
        }
    }

    fn key_enter(&mut self, events: &mut Vec<EditorEvent>) {
        self.multi_crlf();
        let line = self.line.as_str().to_string();
        if line.is_empty() {
            self.hist.reset_pos();
        } else {
            self.hist.add(&line);
        }
        self.reset_line_state();
        self.line.clear();
        self.busy = true;
        events.push(EditorEvent::Line(line));
    }

    fn key_interrupt(&mut self, events: &mut Vec<EditorEvent>) {
        self.multi_crlf();
        self.reset_line_state();
        self.line.clear();
        self.hist.reset_pos();
        events.push(EditorEvent::Interrupt);
    }

    fn key_up(&mut self) {
        if self.hist.current().is_none() {
            // First Up on a fresh line: stash it as the temp entry and
            // step over it.
            let current = self.line.as_str().to_string();
            self.hist.add_temp(&current);
            self.hist.up();
        }
        if let Some(text) = self.hist.up().map(str::to_string) {
            self.line.replace(&text);
        }
    }

    fn key_down(&mut self) {
        if let Some(text) = self.hist.down().map(str::to_string) {
            self.line.replace(&text);
        }
    }

    fn move_cursor(&mut self, width: usize, cur: usize, target: usize) {
        // Integer division on purpose: rows and columns move separately.
        let rows = (target / width) as isize - (cur / width) as isize;
        let cols = (target % width) as isize - (cur % width) as isize;
        if cols > 0 {
            self.term.cursor_forward(cols as usize);
        } else if cols < 0 {
            self.term.cursor_back((-cols) as usize);
        }
        if rows > 0 {
            self.term.cursor_down(rows as usize);
        } else if rows < 0 {
            self.term.cursor_up((-rows) as usize);
        }
    }

    /// Minimal-diff refresh: reuse the equal prefix of the previously
    /// rendered line, repaint fully when the width changed.
    pub fn redisplay(&mut self) {
        let width = self.width.max(1);
        let line_text = self.line.as_str().to_string();
        let line_chars = str_width(&line_text);
        let mut eq_bytes = 0;

        let diff = self.last.as_ref().and_then(|last| {
            if width != self.last_width {
                return None;
            }
            let eq = equal_part(&line_text, &last.text);
            let eq_chars = str_width(&last.text[..eq]);
            let last_pos_chars = str_width(&last.text[..last.pos]);
            Some((eq, eq_chars, last_pos_chars))
        });
        match diff {
            Some((eq, eq_chars, last_pos_chars)) => {
                eq_bytes = eq;
                self.move_cursor(
                    width,
                    self.prompt_chars + last_pos_chars,
                    self.prompt_chars + eq_chars,
                );
            }
            None => {
                if self.last.is_some() {
                    // Width changed: start clean below the old input.
                    self.term.next_line();
                    self.term.erase_down();
                }
                let prompt = self.prompt.clone();
                self.term.text(&prompt);
            }
        }

        self.term.text(&line_text[eq_bytes..]);
        let cols = (self.prompt_chars + line_chars) % width;
        if cols == 0 && line_text.len() > eq_bytes {
            self.term.next_line();
        }
        let shrunk = self
            .last
            .as_ref()
            .is_some_and(|last| last.text.len() > line_text.len());
        if shrunk {
            self.term.erase_down();
        }
        if self.line.pos() < self.line.len() {
            let pos_chars = self.line.width_before_cursor();
            self.move_cursor(
                width,
                self.prompt_chars + line_chars,
                self.prompt_chars + pos_chars,
            );
        }
        self.term.flush();

        self.last = Some(Snapshot {
            text: line_text,
            pos: self.line.pos(),
        });
        self.last_width = width;
    }
}

/// Length of the common prefix of two strings, backed off to a code-point
/// boundary of `a`.
fn equal_part(a: &str, b: &str) -> usize {
    let mut n = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while n > 0 && !a.is_char_boundary(n) {
        n -= 1;
    }
    n
}
