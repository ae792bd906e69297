//! Bounded command history with file persistence.
//!
//! The position cursor is `None` when not navigating. Starting to
//! navigate from a fresh line implicitly stores it as a *temporary*
//! entry, so Down-arrow can bring the user back to their in-progress
//! input; the temporary entry disappears once navigation resets.
//! Re-adding a line that already exists moves it to the end without
//! growing the list.

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<String>,
    /// Index into `entries`; `None` means navigation is reset.
    pos: Option<usize>,
    /// 0 = unbounded.
    stifle: usize,
    path: Option<PathBuf>,
    /// The newest entry is a temporary in-progress line.
    temp: bool,
}

impl History {
    pub fn new(path: Option<PathBuf>, stifle: usize) -> Self {
        let mut hist = Self {
            entries: VecDeque::new(),
            pos: None,
            stifle,
            path,
            temp: false,
        };
        if let Err(e) = hist.restore() {
            tracing::debug!("history not restored: {e}");
        }
        hist
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Drop the temporary entry and leave navigation.
    pub fn reset_pos(&mut self) {
        if self.temp {
            self.entries.pop_back();
            self.temp = false;
        }
        self.pos = None;
    }

    /// Entry under the navigation cursor.
    pub fn current(&self) -> Option<&str> {
        self.pos.and_then(|i| self.entries.get(i)).map(String::as_str)
    }

    pub fn up(&mut self) -> Option<&str> {
        match self.pos {
            None => {
                if self.entries.is_empty() {
                    return None;
                }
                self.pos = Some(self.entries.len() - 1);
            }
            Some(i) if i > 0 => self.pos = Some(i - 1),
            Some(_) => {} // already at the oldest entry
        }
        self.current()
    }

    pub fn down(&mut self) -> Option<&str> {
        let i = self.pos?;
        if i + 1 >= self.entries.len() {
            self.pos = None;
            return None;
        }
        self.pos = Some(i + 1);
        self.current()
    }

    /// Append a real entry. An existing duplicate moves to the end.
    pub fn add(&mut self, line: &str) {
        self.reset_pos();
        if let Some(found) = self.entries.iter().position(|e| e == line) {
            self.entries.remove(found);
        }
        self.entries.push_back(line.to_string());
        if self.stifle != 0 && self.entries.len() > self.stifle {
            self.entries.pop_front();
        }
    }

    /// Store the in-progress line while the user starts navigating.
    pub fn add_temp(&mut self, line: &str) {
        self.reset_pos();
        self.entries.push_back(line.to_string());
        self.temp = true;
    }

    /// One entry per line, oldest first, atomically via truncate-then-
    /// write, mode 0644. The temporary entry is never written.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o644);
        }
        let mut file = opts.open(path)?;
        let skip_temp = usize::from(self.temp);
        for line in self.entries.iter().take(self.entries.len() - skip_temp) {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Reload from the file, truncating to the stifle count.
    pub fn restore(&mut self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = std::fs::read_to_string(path)?;
        self.entries.clear();
        self.pos = None;
        self.temp = false;
        for line in text.lines() {
            if self.stifle != 0 && self.entries.len() >= self.stifle {
                break;
            }
            self.entries.push_back(line.to_string());
        }
        Ok(())
    }
}
