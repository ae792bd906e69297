use bitflags::bitflags;
use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use thiserror::Error;

/// First four bytes of every frame: `"KTP\0"`.
pub const KTP_MAGIC: u32 = u32::from_be_bytes(*b"KTP\0");
pub const KTP_MAJOR: u8 = 1;
pub const KTP_MINOR: u8 = 0;

/// Fixed header: magic(4) major(1) minor(1) cmd(2) status(4) len(4) plen(4).
/// `len` is the total frame length including the header itself.
pub const HDR_LEN: usize = 20;

/// Per-parameter overhead: type(2) + len(4).
const PARAM_HDR_LEN: usize = 6;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("unsupported protocol version {0}.{1}")]
    BadVersion(u8, u8),
    #[error("unknown command 0x{0:04x}")]
    UnknownCmd(u16),
    #[error("frame length {0} is shorter than the header")]
    BadLength(u32),
    #[error("parameter region is truncated")]
    Truncated,
    #[error("header says {expected} parameters, frame carries {found}")]
    ParamCount { expected: u32, found: u32 },
}

/// Requests flow client to daemon, `*_ACK` replies and the stream messages
/// flow back. `STDIN` and `NOTIFICATION` may be sent while a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum KtpCmd {
    Auth = 1,
    AuthAck = 2,
    Cmd = 3,
    CmdAck = 4,
    Completion = 5,
    CompletionAck = 6,
    Help = 7,
    HelpAck = 8,
    Stdin = 9,
    Stdout = 10,
    Stderr = 11,
    StdinClose = 12,
    StdoutClose = 13,
    StderrClose = 14,
    Notification = 15,
    Exit = 16,
}

impl KtpCmd {
    pub fn from_u16(raw: u16) -> Option<Self> {
        Some(match raw {
            1 => Self::Auth,
            2 => Self::AuthAck,
            3 => Self::Cmd,
            4 => Self::CmdAck,
            5 => Self::Completion,
            6 => Self::CompletionAck,
            7 => Self::Help,
            8 => Self::HelpAck,
            9 => Self::Stdin,
            10 => Self::Stdout,
            11 => Self::Stderr,
            12 => Self::StdinClose,
            13 => Self::StdoutClose,
            14 => Self::StderrClose,
            15 => Self::Notification,
            16 => Self::Exit,
            _ => return None,
        })
    }
}

bitflags! {
    /// Status word carried by every message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Status: u32 {
        const EXIT = 0x01;
        const DRY_RUN = 0x02;
        const INCOMPLETED = 0x04;
        const INTERACTIVE = 0x08;
        const NEED_STDIN = 0x10;
        const TTY_STDIN = 0x20;
        const TTY_STDOUT = 0x40;
        const TTY_STDERR = 0x80;
        const ERROR = 0x8000;
    }
}

/// Well-known TLV parameter types. The wire carries a raw `u16`; receivers
/// must skip types they don't know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ParamType {
    Line = 1,
    Prefix = 2,
    Retcode = 3,
    Error = 4,
    Prompt = 5,
    Hotkey = 6,
    Winch = 7,
}

/// One TLV parameter, kept raw so unknown types survive a decode/encode
/// round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ty: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub cmd: KtpCmd,
    pub status: Status,
    pub params: Vec<Param>,
}

impl Msg {
    pub fn new(cmd: KtpCmd, status: Status) -> Self {
        Self {
            cmd,
            status,
            params: Vec::new(),
        }
    }

    pub fn add(&mut self, ty: ParamType, data: impl Into<Vec<u8>>) -> &mut Self {
        self.params.push(Param {
            ty: ty as u16,
            data: data.into(),
        });
        self
    }

    pub fn add_str(&mut self, ty: ParamType, s: &str) -> &mut Self {
        self.add(ty, s.as_bytes().to_vec())
    }

    /// First parameter of the given type, raw bytes.
    pub fn param(&self, ty: ParamType) -> Option<&[u8]> {
        self.params
            .iter()
            .find(|p| p.ty == ty as u16)
            .map(|p| p.data.as_slice())
    }

    /// First parameter of the given type as UTF-8 text (lossy).
    pub fn param_str(&self, ty: ParamType) -> Option<String> {
        self.param(ty)
            .map(|d| String::from_utf8_lossy(d).into_owned())
    }

    /// All parameters of the given type, in wire order.
    pub fn params_of(&self, ty: ParamType) -> impl Iterator<Item = &[u8]> {
        self.params
            .iter()
            .filter(move |p| p.ty == ty as u16)
            .map(|p| p.data.as_slice())
    }

    /// RETCODE is a single byte on the wire.
    pub fn retcode(&self) -> Option<i32> {
        self.param(ParamType::Retcode)
            .and_then(|d| d.first())
            .map(|b| i32::from(*b))
    }

    pub fn set_retcode(&mut self, retcode: i32) -> &mut Self {
        self.add(ParamType::Retcode, vec![(retcode & 0xff) as u8])
    }

    /// HOTKEY parameters are `key\0cmd`.
    pub fn add_hotkey(&mut self, key: &str, cmd: &str) -> &mut Self {
        let mut data = Vec::with_capacity(key.len() + 1 + cmd.len());
        data.extend_from_slice(key.as_bytes());
        data.push(0);
        data.extend_from_slice(cmd.as_bytes());
        self.add(ParamType::Hotkey, data)
    }

    pub fn hotkeys(&self) -> Vec<(String, String)> {
        self.params_of(ParamType::Hotkey)
            .filter_map(|d| {
                let sep = d.iter().position(|b| *b == 0)?;
                let key = String::from_utf8_lossy(&d[..sep]).into_owned();
                let cmd = String::from_utf8_lossy(&d[sep + 1..]).into_owned();
                Some((key, cmd))
            })
            .collect()
    }

    /// WINCH parameter carries `"WxH"`.
    pub fn add_winch(&mut self, width: u16, height: u16) -> &mut Self {
        self.add_str(ParamType::Winch, &format!("{width}x{height}"))
    }

    pub fn winch(&self) -> Option<(u16, u16)> {
        let text = self.param_str(ParamType::Winch)?;
        let (w, h) = text.split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?))
    }

    pub fn encode(&self) -> Bytes {
        let params_len: usize = self
            .params
            .iter()
            .map(|p| PARAM_HDR_LEN + p.data.len())
            .sum();
        let total = HDR_LEN + params_len;
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32(KTP_MAGIC);
        buf.put_u8(KTP_MAJOR);
        buf.put_u8(KTP_MINOR);
        buf.put_u16(self.cmd as u16);
        buf.put_u32(self.status.bits());
        buf.put_u32(total as u32);
        buf.put_u32(self.params.len() as u32);
        for p in &self.params {
            buf.put_u16(p.ty);
            buf.put_u32(p.data.len() as u32);
            buf.put_slice(&p.data);
        }
        buf.freeze()
    }

    /// Decode a complete frame (header plus parameter region).
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < HDR_LEN {
            return Err(FrameError::Truncated);
        }
        let (hdr, body) = frame.split_at(HDR_LEN);
        let (cmd, status, len, plen) = parse_header(hdr)?;
        if body.len() != len as usize - HDR_LEN {
            return Err(FrameError::Truncated);
        }
        Self::decode_parts(cmd, status, plen, body)
    }

    /// Decode the parameter region once the header has been validated.
    pub(crate) fn decode_parts(
        cmd: KtpCmd,
        status: Status,
        plen: u32,
        mut body: &[u8],
    ) -> Result<Self, FrameError> {
        let mut params = Vec::new();
        while body.has_remaining() {
            if body.remaining() < PARAM_HDR_LEN {
                return Err(FrameError::Truncated);
            }
            let ty = body.get_u16();
            let dlen = body.get_u32() as usize;
            if body.remaining() < dlen {
                return Err(FrameError::Truncated);
            }
            let data = body[..dlen].to_vec();
            body.advance(dlen);
            params.push(Param { ty, data });
        }
        if params.len() as u32 != plen {
            return Err(FrameError::ParamCount {
                expected: plen,
                found: params.len() as u32,
            });
        }
        Ok(Self {
            cmd,
            status,
            params,
        })
    }
}

/// Validate a raw header and return `(cmd, status, len, plen)`.
pub(crate) fn parse_header(mut hdr: &[u8]) -> Result<(KtpCmd, Status, u32, u32), FrameError> {
    debug_assert!(hdr.len() >= HDR_LEN);
    let magic = hdr.get_u32();
    if magic != KTP_MAGIC {
        return Err(FrameError::BadMagic(magic));
    }
    let major = hdr.get_u8();
    let minor = hdr.get_u8();
    if major != KTP_MAJOR || minor != KTP_MINOR {
        return Err(FrameError::BadVersion(major, minor));
    }
    let raw_cmd = hdr.get_u16();
    let cmd = KtpCmd::from_u16(raw_cmd).ok_or(FrameError::UnknownCmd(raw_cmd))?;
    let status = Status::from_bits_retain(hdr.get_u32());
    let len = hdr.get_u32();
    if (len as usize) < HDR_LEN {
        return Err(FrameError::BadLength(len));
    }
    let plen = hdr.get_u32();
    Ok((cmd, status, len, plen))
}
