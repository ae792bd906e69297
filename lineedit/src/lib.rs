//! Line editor for the interactive client: UTF-8 line buffer, bounded
//! history with a file, and a minimal-redraw VT100 renderer, all driven
//! byte by byte. The terminal transport (raw mode, the socket) stays with
//! the caller.

mod editor;
mod history;
mod line;
mod term;
mod width;

pub use editor::Editor;
pub use editor::EditorEvent;
pub use history::History;
pub use line::LineBuffer;
pub use width::char_width;
pub use width::str_width;
