//! Local terminal plumbing: raw mode, size queries, tty detection.

use std::io;
use std::os::fd::RawFd;

use klish_protocol::Status;

/// Puts a descriptor into raw mode, restoring the saved settings on drop.
#[derive(Debug)]
pub struct RawMode {
    fd: RawFd,
    saved: libc::termios,
}

impl RawMode {
    pub fn enable(fd: RawFd) -> io::Result<Self> {
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut raw = saved;
        raw.c_iflag = 0;
        raw.c_oflag = libc::OPOST | libc::ONLCR;
        raw.c_lflag = 0;
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(fd, libc::TCSADRAIN, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, saved })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSADRAIN, &self.saved);
        }
    }
}

pub fn is_tty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// Local tty facts sent with AUTH.
pub fn tty_status() -> Status {
    let mut status = Status::empty();
    if is_tty(libc::STDIN_FILENO) {
        status |= Status::TTY_STDIN;
    }
    if is_tty(libc::STDOUT_FILENO) {
        status |= Status::TTY_STDOUT;
    }
    if is_tty(libc::STDERR_FILENO) {
        status |= Status::TTY_STDERR;
    }
    status
}

/// Terminal size of stdout, with the classic fallback.
pub fn term_size() -> (u16, u16) {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if rc != 0 || ws.ws_col == 0 || ws.ws_row == 0 {
        return (80, 25);
    }
    (ws.ws_col, ws.ws_row)
}
