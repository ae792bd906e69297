//! KTP, the length-prefixed tagged-parameter protocol spoken between the
//! interactive `klish` client and the `klishd` daemon over a local stream
//! socket.
//!
//! The wire format is fixed: a 20-byte big-endian header (magic, version,
//! command, status, total length, parameter count) followed by TLV
//! parameters. See [`Msg`] for the message model and [`FrameDecoder`] for
//! the incremental reader used on top of an async byte stream.

mod message;
mod reader;

pub use message::FrameError;
pub use message::HDR_LEN;
pub use message::KTP_MAGIC;
pub use message::KTP_MAJOR;
pub use message::KTP_MINOR;
pub use message::KtpCmd;
pub use message::Msg;
pub use message::Param;
pub use message::ParamType;
pub use message::Status;
pub use reader::FrameDecoder;
pub use reader::MsgWriter;
pub use reader::read_msg;
pub use reader::spawn_writer;
pub use reader::write_msg;
