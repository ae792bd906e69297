//! Interactive shell: the line editor wired to the client session.

use std::collections::HashMap;
use std::io::Write;

use klish_lineedit::Editor;
use klish_lineedit::EditorEvent;
use klish_lineedit::History;
use tokio::io::AsyncReadExt;
use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;

use crate::session::ClientEvent;
use crate::session::ClientSession;
use crate::tty;

const HISTORY_STIFLE: usize = 100;

/// Flushing stdout writer for the editor.
struct TermSink;

impl Write for TermSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stdout().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()
    }
}

/// Map the wire hotkey notation (`^Z`) to its control byte.
fn hotkey_byte(key: &str) -> Option<u8> {
    let mut chars = key.chars();
    if chars.next() != Some('^') {
        return None;
    }
    let letter = chars.next()?;
    if !letter.is_ascii_uppercase() || chars.next().is_some() {
        return None;
    }
    Some(letter as u8 - b'@')
}

pub async fn run_interactive(session: &mut ClientSession, dry_run: bool) -> anyhow::Result<i32> {
    let history_path = dirs::home_dir().map(|home| home.join(".klish_history"));
    let mut editor = Editor::new(TermSink, History::new(history_path, HISTORY_STIFLE));
    let _raw = tty::RawMode::enable(libc::STDIN_FILENO)?;
    let (width, height) = tty::term_size();
    editor.set_width(width);

    let mut hotkeys: HashMap<u8, String> = HashMap::new();
    let mut winch = signal(SignalKind::window_change())?;
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 1024];
    // While a command with NEED_STDIN runs, keystrokes bypass the editor.
    let mut pass_through = false;

    session.auth(tty::tty_status()).await?;
    session.winch(width, height).await?;

    loop {
        tokio::select! {
            event = session.next() => {
                let Some(event) = event else { break };
                match event {
                    ClientEvent::AuthOk { prompt, hotkeys: keys, error } => {
                        if let Some(error) = error {
                            editor.output(format!("Error: {error}\r\n").as_bytes());
                        }
                        if let Some(prompt) = prompt {
                            editor.set_prompt(&prompt);
                        }
                        apply_hotkeys(&mut hotkeys, keys);
                        editor.redisplay();
                    }
                    ClientEvent::Stdout(bytes) | ClientEvent::Stderr(bytes) => {
                        editor.output(&bytes);
                    }
                    ClientEvent::CmdFeatures { need_stdin, .. } => {
                        pass_through = need_stdin;
                    }
                    ClientEvent::CmdDone { error, prompt, hotkeys: keys, .. } => {
                        pass_through = false;
                        if session.stdout_need_newline || session.stderr_need_newline {
                            editor.output(b"\r\n");
                        }
                        if let Some(error) = error {
                            for line in error.lines() {
                                editor.output(format!("Error: {line}\r\n").as_bytes());
                            }
                        }
                        if let Some(prompt) = prompt {
                            editor.set_prompt(&prompt);
                        }
                        apply_hotkeys(&mut hotkeys, keys);
                        if session.done {
                            break;
                        }
                        editor.reset_line_state();
                        editor.redisplay();
                    }
                    ClientEvent::CompletionDone { prefix, completions } => {
                        apply_completion(&mut editor, prefix.as_deref(), &completions);
                    }
                    ClientEvent::HelpDone { items } => {
                        display_help(&mut editor, &items);
                    }
                }
            }
            read = stdin.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                if pass_through {
                    // Raw keystrokes (Ctrl-C included) belong to the
                    // remote command, delivered through its pty.
                    session.stdin(&buf[..n]).await?;
                    continue;
                }
                let mut quit = false;
                for event in editor.input(&buf[..n]) {
                    match event {
                        EditorEvent::Line(line) => {
                            if line.trim().is_empty() {
                                editor.redisplay();
                            } else {
                                session.cmd(&line, dry_run).await?;
                            }
                        }
                        EditorEvent::Completion(line) => {
                            session.completion(&line).await?;
                        }
                        EditorEvent::Help(line) => {
                            session.help(&line).await?;
                        }
                        EditorEvent::Hotkey(byte) => {
                            if let Some(cmd) = hotkeys.get(&byte).cloned() {
                                editor.multi_crlf();
                                editor.reset_line_state();
                                session.cmd(&cmd, dry_run).await?;
                            }
                        }
                        EditorEvent::Interrupt => {
                            // The line was reset locally; a running remote
                            // command is only reachable via its stdin.
                        }
                        EditorEvent::Eof => {
                            quit = true;
                        }
                    }
                }
                if quit {
                    break;
                }
            }
            _ = winch.recv() => {
                let (width, height) = tty::term_size();
                editor.set_width(width);
                session.winch(width, height).await?;
                editor.redisplay();
            }
        }
    }

    editor.multi_crlf();
    if let Err(e) = editor.history().save() {
        tracing::warn!("can't save history: {e}");
    }
    Ok(session.retcode)
}

fn apply_hotkeys(map: &mut HashMap<u8, String>, keys: Vec<(String, String)>) {
    if keys.is_empty() {
        return;
    }
    map.clear();
    for (key, cmd) in keys {
        if let Some(byte) = hotkey_byte(&key) {
            map.insert(byte, cmd);
        } else {
            tracing::warn!(key, "unparsable hotkey");
        }
    }
}

/// Insert the unambiguous part; with several variants and no common part
/// print them in columns under the current line.
fn apply_completion(editor: &mut Editor<TermSink>, prefix: Option<&str>, completions: &[String]) {
    match completions {
        [] => {
            editor.ding();
            editor.redisplay();
        }
        [single] => {
            editor.insert(single);
            editor.redisplay();
        }
        [first, rest @ ..] => {
            let mut eq = first.len();
            for compl in rest {
                eq = eq.min(common_prefix(first, compl));
            }
            if eq > 0 {
                editor.insert(&first[..eq]);
                editor.redisplay();
            } else {
                editor.multi_crlf();
                editor.reset_line_state();
                display_completions(editor, prefix, completions);
                editor.redisplay();
            }
        }
    }
}

fn common_prefix(a: &str, b: &str) -> usize {
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

fn display_completions(editor: &mut Editor<TermSink>, prefix: Option<&str>, completions: &[String]) {
    let prefix = prefix.unwrap_or("");
    let max = completions.iter().map(String::len).max().unwrap_or(0);
    let cell = prefix.len() + max + 1;
    let width = editor.width();
    let cols = if cell < width { width / cell } else { 1 }.max(1);
    let mut filled = 0;
    let mut out = String::new();
    for compl in completions {
        out.push_str(prefix);
        out.push_str(compl);
        for _ in compl.len()..(max + 1) {
            out.push(' ');
        }
        filled += 1;
        if filled >= cols {
            filled = 0;
            out.push_str("\r\n");
        }
    }
    if filled != 0 {
        out.push_str("\r\n");
    }
    editor.output(out.as_bytes());
}

fn display_help(editor: &mut Editor<TermSink>, items: &[(String, String)]) {
    if items.is_empty() {
        editor.ding();
        editor.redisplay();
        return;
    }
    editor.multi_crlf();
    editor.reset_line_state();
    let max = items.iter().map(|(prefix, _)| prefix.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (prefix, text) in items {
        out.push_str("  ");
        out.push_str(prefix);
        for _ in prefix.len()..max + 2 {
            out.push(' ');
        }
        out.push_str(text);
        out.push_str("\r\n");
    }
    editor.output(out.as_bytes());
    editor.redisplay();
}
