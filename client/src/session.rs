//! Client-side KTP session state machine.
//!
//! ```text
//! DISCONNECTED -> UNAUTHORIZED -> IDLE
//!                                  ^
//!                                  v
//!        WAIT_FOR_CMD / WAIT_FOR_COMPLETION / WAIT_FOR_HELP
//! ```
//!
//! A spawned task reads frames off the socket into a queue; the owner
//! pulls [`ClientEvent`]s out of [`ClientSession::next`]. Unexpected
//! messages for the current state are logged and dropped.

use std::path::Path;

use klish_protocol::KtpCmd;
use klish_protocol::Msg;
use klish_protocol::MsgWriter;
use klish_protocol::ParamType;
use klish_protocol::Status;
use klish_protocol::read_msg;
use klish_protocol::spawn_writer;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

const INCOMING_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Unauthorized,
    Idle,
    WaitForCmd,
    WaitForCompletion,
    WaitForHelp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    AuthOk {
        prompt: Option<String>,
        hotkeys: Vec<(String, String)>,
        error: Option<String>,
    },
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// The partial ack announcing command features before any output.
    CmdFeatures {
        interactive: bool,
        need_stdin: bool,
    },
    CmdDone {
        retcode: i32,
        error: Option<String>,
        prompt: Option<String>,
        hotkeys: Vec<(String, String)>,
    },
    /// `prefix` is the unfinished token; completions are the suffixes
    /// that could extend it.
    CompletionDone {
        prefix: Option<String>,
        completions: Vec<String>,
    },
    HelpDone {
        items: Vec<(String, String)>,
    },
}

pub struct ClientSession {
    writer: MsgWriter,
    incoming: mpsc::Receiver<Msg>,
    state: ClientState,
    pub done: bool,
    /// Retcode of the last completed command.
    pub retcode: i32,
    cmd_features_seen: bool,
    pub stdout_need_newline: bool,
    pub stderr_need_newline: bool,
}

impl ClientSession {
    pub async fn connect(socket: &Path) -> std::io::Result<Self> {
        let stream = UnixStream::connect(socket).await?;
        let (mut read_half, write_half) = stream.into_split();
        let (writer, _writer_task) = spawn_writer(write_half);
        let (tx, incoming) = mpsc::channel(INCOMING_QUEUE);
        tokio::spawn(async move {
            loop {
                match read_msg(&mut read_half).await {
                    Ok(Some(msg)) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("broken ktp stream: {e}");
                        break;
                    }
                }
            }
        });
        Ok(Self {
            writer,
            incoming,
            state: ClientState::Unauthorized,
            done: false,
            retcode: 0,
            cmd_features_seen: false,
            stdout_need_newline: false,
            stderr_need_newline: false,
        })
    }

    /// Next meaningful event. `None` means the connection is gone; the
    /// done flag is set.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        loop {
            let Some(msg) = self.incoming.recv().await else {
                self.done = true;
                return None;
            };
            if let Some(event) = self.dispatch(msg) {
                return Some(event);
            }
        }
    }

    fn dispatch(&mut self, msg: Msg) -> Option<ClientEvent> {
        match msg.cmd {
            KtpCmd::AuthAck => {
                if self.state != ClientState::Unauthorized {
                    tracing::warn!("unexpected AUTH_ACK");
                    return None;
                }
                self.finish_request(&msg);
                Some(ClientEvent::AuthOk {
                    prompt: msg.param_str(ParamType::Prompt),
                    hotkeys: msg.hotkeys(),
                    error: msg.param_str(ParamType::Error),
                })
            }
            KtpCmd::CmdAck => {
                if self.state != ClientState::WaitForCmd {
                    tracing::warn!("unexpected CMD_ACK");
                    return None;
                }
                if msg.status.contains(Status::INCOMPLETED) {
                    // Only the first partial ack carries the features.
                    if self.cmd_features_seen {
                        return None;
                    }
                    self.cmd_features_seen = true;
                    return Some(ClientEvent::CmdFeatures {
                        interactive: msg.status.contains(Status::INTERACTIVE),
                        need_stdin: msg.status.contains(Status::NEED_STDIN),
                    });
                }
                self.finish_request(&msg);
                // A missing retcode means nothing ran: fine unless the
                // error bit says otherwise.
                let retcode = msg.retcode().unwrap_or_else(|| {
                    if msg.status.contains(Status::ERROR) { -1 } else { 0 }
                });
                self.retcode = retcode;
                Some(ClientEvent::CmdDone {
                    retcode,
                    error: msg.param_str(ParamType::Error),
                    prompt: msg.param_str(ParamType::Prompt),
                    hotkeys: msg.hotkeys(),
                })
            }
            KtpCmd::CompletionAck => {
                if self.state != ClientState::WaitForCompletion {
                    tracing::warn!("unexpected COMPLETION_ACK");
                    return None;
                }
                self.finish_request(&msg);
                let completions = msg
                    .params_of(ParamType::Line)
                    .map(|d| String::from_utf8_lossy(d).into_owned())
                    .collect();
                Some(ClientEvent::CompletionDone {
                    prefix: msg.param_str(ParamType::Prefix),
                    completions,
                })
            }
            KtpCmd::HelpAck => {
                if self.state != ClientState::WaitForHelp {
                    tracing::warn!("unexpected HELP_ACK");
                    return None;
                }
                self.finish_request(&msg);
                Some(ClientEvent::HelpDone {
                    items: help_pairs(&msg),
                })
            }
            KtpCmd::Stdout => {
                if self.state != ClientState::WaitForCmd {
                    tracing::warn!("unexpected STDOUT");
                    return None;
                }
                let data = msg.param(ParamType::Line)?.to_vec();
                if let Some(last) = data.last() {
                    self.stdout_need_newline = *last != b'\n';
                }
                Some(ClientEvent::Stdout(data))
            }
            KtpCmd::Stderr => {
                if self.state != ClientState::WaitForCmd {
                    tracing::warn!("unexpected STDERR");
                    return None;
                }
                let data = msg.param(ParamType::Line)?.to_vec();
                if let Some(last) = data.last() {
                    self.stderr_need_newline = *last != b'\n';
                }
                Some(ClientEvent::Stderr(data))
            }
            other => {
                tracing::warn!("unsupported command {other:?}");
                None
            }
        }
    }

    fn finish_request(&mut self, msg: &Msg) {
        self.state = ClientState::Idle;
        if msg.status.contains(Status::EXIT) {
            self.done = true;
        }
    }

    fn drop_request_state(&mut self) {
        self.cmd_features_seen = false;
        self.stdout_need_newline = false;
        self.stderr_need_newline = false;
    }

    /// Handshake carrying the local tty facts.
    pub async fn auth(&mut self, tty_status: Status) -> std::io::Result<()> {
        self.drop_request_state();
        self.state = ClientState::Unauthorized;
        self.send(Msg::new(KtpCmd::Auth, tty_status)).await
    }

    pub async fn cmd(&mut self, line: &str, dry_run: bool) -> std::io::Result<()> {
        self.drop_request_state();
        let status = if dry_run {
            Status::DRY_RUN
        } else {
            Status::empty()
        };
        let mut msg = Msg::new(KtpCmd::Cmd, status);
        msg.add_str(ParamType::Line, line);
        self.state = ClientState::WaitForCmd;
        self.send(msg).await
    }

    pub async fn completion(&mut self, line: &str) -> std::io::Result<()> {
        self.drop_request_state();
        let mut msg = Msg::new(KtpCmd::Completion, Status::empty());
        msg.add_str(ParamType::Line, line);
        self.state = ClientState::WaitForCompletion;
        self.send(msg).await
    }

    pub async fn help(&mut self, line: &str) -> std::io::Result<()> {
        self.drop_request_state();
        let mut msg = Msg::new(KtpCmd::Help, Status::empty());
        msg.add_str(ParamType::Line, line);
        self.state = ClientState::WaitForHelp;
        self.send(msg).await
    }

    /// Forward keystrokes to the running command.
    pub async fn stdin(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let mut msg = Msg::new(KtpCmd::Stdin, Status::empty());
        msg.add(ParamType::Line, bytes.to_vec());
        self.send(msg).await
    }

    pub async fn stdin_close(&mut self) -> std::io::Result<()> {
        self.send(Msg::new(KtpCmd::StdinClose, Status::empty())).await
    }

    pub async fn winch(&mut self, width: u16, height: u16) -> std::io::Result<()> {
        let mut msg = Msg::new(KtpCmd::Notification, Status::empty());
        msg.add_winch(width, height);
        self.send(msg).await
    }

    async fn send(&mut self, msg: Msg) -> std::io::Result<()> {
        self.writer
            .send(msg)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "daemon is gone"))
    }
}

/// HELP_ACK carries alternating PREFIX/LINE parameters.
fn help_pairs(msg: &Msg) -> Vec<(String, String)> {
    let mut items = Vec::new();
    let mut prefix: Option<String> = None;
    for param in &msg.params {
        if param.ty == ParamType::Prefix as u16 {
            prefix = Some(String::from_utf8_lossy(&param.data).into_owned());
        } else if param.ty == ParamType::Line as u16 {
            if let Some(prefix) = prefix.take() {
                items.push((prefix, String::from_utf8_lossy(&param.data).into_owned()));
            }
        }
    }
    items
}
