#![allow(clippy::unwrap_used, clippy::expect_used)]

use klish_lineedit::Editor;
use klish_lineedit::EditorEvent;
use klish_lineedit::History;
use pretty_assertions::assert_eq;

type Sink = std::rc::Rc<std::cell::RefCell<Vec<u8>>>;

#[derive(Clone, Default)]
struct SharedSink(Sink);

impl std::io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn editor() -> (Editor<SharedSink>, Sink) {
    let sink = SharedSink::default();
    let bytes = sink.0.clone();
    let mut ed = Editor::new(sink, History::new(None, 0));
    ed.set_prompt("> ");
    ed.redisplay();
    bytes.borrow_mut().clear();
    (ed, bytes)
}

fn drain(sink: &Sink) -> String {
    let mut bytes = sink.borrow_mut();
    let text = String::from_utf8_lossy(&bytes).into_owned();
    bytes.clear();
    text
}

#[test]
fn typing_appends_without_reprinting_the_prompt() {
    let (mut ed, sink) = editor();
    let events = ed.input(b"a");
    assert!(events.is_empty());
    assert_eq!(drain(&sink), "a");
    ed.input(b"b");
    assert_eq!(drain(&sink), "b");
    assert_eq!(ed.line(), "ab");
}

#[test]
fn backspace_erases_with_minimal_output() {
    let (mut ed, sink) = editor();
    ed.input(b"ab");
    drain(&sink);
    ed.input(&[0x7f]);
    // Move one column back, then erase the tail.
    assert_eq!(drain(&sink), "\x1b[1D\x1b[J");
    assert_eq!(ed.line(), "a");
}

#[test]
fn enter_emits_the_line_and_records_history() {
    let (mut ed, sink) = editor();
    let mut events = ed.input(b"show log\r");
    assert_eq!(events.pop(), Some(EditorEvent::Line("show log".to_string())));
    assert_eq!(ed.line(), "");
    assert_eq!(ed.history().iter().collect::<Vec<_>>(), vec!["show log"]);
    // The submit jumped to a fresh line.
    assert!(drain(&sink).ends_with("\r\n"));
}

#[test]
fn arrow_keys_move_the_cursor_and_edit_midline() {
    let (mut ed, _sink) = editor();
    ed.input(b"hllo");
    // Left three times, insert the missing 'e'.
    ed.input(b"\x1b[D\x1b[D\x1b[D");
    ed.input(b"e");
    assert_eq!(ed.line(), "hello");
}

#[test]
fn utf8_input_is_accumulated_per_codepoint() {
    let (mut ed, sink) = editor();
    // 世 = E4 B8 96, fed one byte at a time.
    ed.input(&[0xe4]);
    assert_eq!(drain(&sink), "", "incomplete char must not render");
    ed.input(&[0xb8]);
    assert_eq!(drain(&sink), "");
    ed.input(&[0x96]);
    assert_eq!(drain(&sink), "世");
    assert_eq!(ed.line(), "世");
}

#[test]
fn history_navigation_with_temp_entry() {
    let (mut ed, _sink) = editor();
    ed.input(b"first\r");
    ed.input(b"second\r");
    ed.input(b"in progre");
    // Up twice: second, then first.
    ed.input(b"\x1b[A");
    assert_eq!(ed.line(), "second");
    ed.input(b"\x1b[A");
    assert_eq!(ed.line(), "first");
    // Down twice: second, then the stashed in-progress line.
    ed.input(b"\x1b[B");
    assert_eq!(ed.line(), "second");
    ed.input(b"\x1b[B");
    assert_eq!(ed.line(), "in progre");
}

#[test]
fn interrupt_resets_the_line() {
    let (mut ed, _sink) = editor();
    ed.input(b"half typed");
    let events = ed.input(&[0x03]);
    assert_eq!(events, vec![EditorEvent::Interrupt]);
    assert_eq!(ed.line(), "");
}

#[test]
fn tab_and_question_request_completion_and_help() {
    let (mut ed, _sink) = editor();
    ed.input(b"se");
    let events = ed.input(b"\t");
    assert_eq!(events, vec![EditorEvent::Completion("se".to_string())]);
    let events = ed.input(b"?");
    assert_eq!(events, vec![EditorEvent::Help("se".to_string())]);
    // With help disabled, '?' is an ordinary character.
    ed.set_question_help(false);
    let events = ed.input(b"?");
    assert!(events.is_empty());
    assert_eq!(ed.line(), "se?");
}

#[test]
fn ctrl_d_on_empty_line_is_eof() {
    let (mut ed, _sink) = editor();
    let events = ed.input(&[0x04]);
    assert_eq!(events, vec![EditorEvent::Eof]);
    // With content it deletes under the cursor instead.
    ed.input(b"ab\x01");
    let events = ed.input(&[0x04]);
    assert!(events.is_empty());
    assert_eq!(ed.line(), "b");
}

#[test]
fn unbound_control_bytes_surface_as_hotkeys() {
    let (mut ed, _sink) = editor();
    let events = ed.input(&[0x1a]); // Ctrl-Z
    assert_eq!(events, vec![EditorEvent::Hotkey(0x1a)]);
    assert_eq!(ed.line(), "");
}

#[test]
fn width_change_forces_a_full_repaint() {
    let (mut ed, sink) = editor();
    ed.input(b"abc");
    drain(&sink);
    ed.set_width(40);
    ed.redisplay();
    let out = drain(&sink);
    assert!(out.contains("> abc"), "full prompt+line repaint: {out:?}");
}

#[test]
fn wrapped_line_emits_a_line_break_at_the_boundary() {
    let (mut ed, sink) = editor();
    ed.set_width(10);
    ed.redisplay();
    drain(&sink);
    // Prompt is 2 columns; the 8th character lands on column 10.
    ed.input(b"12345678");
    let out = drain(&sink);
    assert!(out.ends_with("8\r\n"), "{out:?}");
}

#[test]
fn kill_and_yank() {
    let (mut ed, _sink) = editor();
    ed.input(b"show log level");
    ed.input(b"\x01"); // home
    ed.input(b"\x0b"); // kill to end
    assert_eq!(ed.line(), "");
    ed.input(b"\x19"); // yank
    assert_eq!(ed.line(), "show log level");
}

#[test]
fn ctrl_w_deletes_the_previous_word() {
    let (mut ed, _sink) = editor();
    ed.input(b"show log level");
    ed.input(&[0x17]);
    assert_eq!(ed.line(), "show log ");
}
