//! Interactive KTP client: the session state machine plus the editor
//! glue and the batch runner used by the `klish` binary.

mod batch;
mod interactive;
mod session;
mod tty;

pub use batch::run_commands;
pub use interactive::run_interactive;
pub use session::ClientEvent;
pub use session::ClientSession;
pub use tty::RawMode;
pub use tty::is_tty;
pub use tty::term_size;
pub use tty::tty_status;
