use bytes::BytesMut;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::message::FrameError;
use crate::message::HDR_LEN;
use crate::message::Msg;
use crate::message::parse_header;

/// Outgoing messages queued ahead of the socket. A full queue suspends the
/// producer until the writer task drains it.
const OUTGOING_QUEUE: usize = 64;

/// Incremental KTP frame decoder.
///
/// Bytes may arrive in arbitrary chunks; [`FrameDecoder::feed`] buffers them
/// and yields every message that became complete. A frame error is terminal
/// for the connection, matching the drop-on-broken-frame policy.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Msg>, FrameError> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        loop {
            if self.buf.len() < HDR_LEN {
                break;
            }
            let (cmd, status, len, plen) = parse_header(&self.buf[..HDR_LEN])?;
            let total = len as usize;
            if self.buf.len() < total {
                break;
            }
            let frame = self.buf.split_to(total);
            let msg = Msg::decode_parts(cmd, status, plen, &frame[HDR_LEN..])?;
            out.push(msg);
        }
        Ok(out)
    }

    /// Bytes buffered but not yet forming a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Read one message from an async byte stream. Returns `Ok(None)` on a clean
/// EOF at a frame boundary.
pub async fn read_msg<R>(reader: &mut R) -> Result<Option<Msg>, ReadMsgError>
where
    R: AsyncRead + Unpin,
{
    let mut hdr = [0u8; HDR_LEN];
    match reader.read_exact(&mut hdr).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ReadMsgError::Io(e)),
    }
    let (cmd, status, len, plen) = parse_header(&hdr)?;
    let mut body = vec![0u8; len as usize - HDR_LEN];
    reader.read_exact(&mut body).await?;
    let msg = Msg::decode_parts(cmd, status, plen, &body)?;
    Ok(Some(msg))
}

pub async fn write_msg<W>(writer: &mut W, msg: &Msg) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&msg.encode()).await?;
    writer.flush().await
}

#[derive(Debug, thiserror::Error)]
pub enum ReadMsgError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Handle to the outgoing half of a connection.
#[derive(Clone, Debug)]
pub struct MsgWriter {
    tx: mpsc::Sender<Msg>,
}

impl MsgWriter {
    /// Queue a message for sending. Fails once the peer is gone.
    pub async fn send(&self, msg: Msg) -> Result<(), WriterClosed> {
        self.tx.send(msg).await.map_err(|_| WriterClosed)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("connection writer is closed")]
pub struct WriterClosed;

/// Spawn the writer task that drains queued messages into the socket.
/// The task ends when every [`MsgWriter`] clone is dropped or the socket
/// rejects a write.
pub fn spawn_writer<W>(mut writer: W) -> (MsgWriter, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Msg>(OUTGOING_QUEUE);
    let handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write_msg(&mut writer, &msg).await {
                tracing::warn!("ktp write failed: {e}");
                break;
            }
        }
    });
    (MsgWriter { tx }, handle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::KtpCmd;
    use crate::message::ParamType;
    use crate::message::Status;
    use pretty_assertions::assert_eq;

    #[test]
    fn decoder_handles_zero_param_frames() {
        let msg = Msg::new(KtpCmd::StdinClose, Status::empty());
        let mut dec = FrameDecoder::new();
        let got = dec.feed(&msg.encode()).unwrap();
        assert_eq!(got, vec![msg]);
        assert_eq!(dec.pending(), 0);
    }

    #[test]
    fn decoder_rejects_garbage() {
        let mut dec = FrameDecoder::new();
        assert!(dec.feed(&[0xffu8; HDR_LEN]).is_err());
    }

    #[tokio::test]
    async fn read_msg_sees_clean_eof() {
        let mut msg = Msg::new(KtpCmd::Stdout, Status::empty());
        msg.add_str(ParamType::Line, "hello\n");
        let bytes = msg.encode();
        let mut cursor = std::io::Cursor::new(bytes.to_vec());
        let first = read_msg(&mut cursor).await.unwrap();
        assert_eq!(first, Some(msg));
        let second = read_msg(&mut cursor).await.unwrap();
        assert_eq!(second, None);
    }
}
