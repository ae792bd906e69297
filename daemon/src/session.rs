//! Per-client daemon session.
//!
//! ```text
//! UNAUTHORIZED -> IDLE -> WAIT_FOR_PROCESS
//! ```
//!
//! UNAUTHORIZED honors only `AUTH`; IDLE serves `CMD`, `COMPLETION`,
//! `HELP` and `NOTIFICATION`; WAIT_FOR_PROCESS accepts `STDIN` and
//! window-size notifications while the executor streams output back.

use std::collections::BTreeSet;
use std::sync::Arc;

use klish_core::EntryId;
use klish_core::EntryPurpose;
use klish_core::Kexec;
use klish_core::KexecEvent;
use klish_core::KexecResult;
use klish_core::Parg;
use klish_core::Pargv;
use klish_core::PluginHost;
use klish_core::Scheme;
use klish_core::Session;
use klish_core::SessionInfo;
use klish_core::exec_locally;
use klish_core::parse_for_completion;
use klish_core::parse_for_exec;
use klish_protocol::KtpCmd;
use klish_protocol::Msg;
use klish_protocol::MsgWriter;
use klish_protocol::ParamType;
use klish_protocol::Status;
use klish_protocol::read_msg;
use klish_protocol::spawn_writer;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use crate::user::username_for_uid;

const INCOMING_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonState {
    Unauthorized,
    Idle,
    WaitForProcess,
}

enum Wake {
    Msg(Option<Msg>),
    Exec(Option<KexecEvent>),
}

pub struct DaemonSession {
    scheme: Arc<Scheme>,
    plugins: Arc<PluginHost>,
    session: Session,
    writer: MsgWriter,
    state: DaemonState,
    exec: Option<klish_core::RunningKexec>,
    /// Path snapshot at command start, for view-change detection.
    saved_path: Vec<EntryId>,
    /// First-stage pargv of the running command, for the LOG hook.
    cmd_pargv: Option<Pargv>,
    /// Finish the in-flight command, then stop the loop. Distinct from
    /// the scheme-visible session done flag.
    exit: bool,
}

/// Handle one accepted connection to completion.
pub async fn serve(
    stream: UnixStream,
    scheme: Arc<Scheme>,
    plugins: Arc<PluginHost>,
    start_view: &str,
) {
    let info = match stream.peer_cred() {
        Ok(cred) => {
            let uid = cred.uid();
            SessionInfo {
                uid,
                user: username_for_uid(uid).unwrap_or_else(|| uid.to_string()),
                pid: cred.pid().map(|pid| pid as u32).unwrap_or_default(),
                term_width: 80,
                term_height: 25,
            }
        }
        Err(e) => {
            tracing::warn!("no peer credentials: {e}");
            SessionInfo::default()
        }
    };
    tracing::info!(user = %info.user, uid = info.uid, "client connected");

    let session = match Session::new(&scheme, start_view, info) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("can't start session: {e}");
            return;
        }
    };

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
                    // Broken frame: drop the connection.
                    tracing::warn!("broken ktp stream: {e}");
                    break;
                }
            }
        }
    });

    let mut daemon = DaemonSession {
        scheme,
        plugins,
        session,
        writer,
        state: DaemonState::Unauthorized,
        exec: None,
        saved_path: Vec::new(),
        cmd_pargv: None,
        exit: false,
    };
    daemon.run(incoming).await;
    tracing::info!("client disconnected");
}

impl DaemonSession {
    async fn run(&mut self, mut incoming: mpsc::Receiver<Msg>) {
        loop {
            let wake = match &mut self.exec {
                Some(running) => {
                    tokio::select! {
                        msg = incoming.recv() => Wake::Msg(msg),
                        event = running.events.recv() => Wake::Exec(event),
                    }
                }
                None => Wake::Msg(incoming.recv().await),
            };
            match wake {
                Wake::Msg(None) => break,
                Wake::Msg(Some(msg)) => self.dispatch(msg).await,
                Wake::Exec(Some(event)) => self.on_exec_event(event).await,
                Wake::Exec(None) => {
                    // The executor died without a final event.
                    self.exec = None;
                    self.state = DaemonState::Idle;
                    self.send_error(KtpCmd::CmdAck, "Execution aborted").await;
                }
            }
            if self.exit && self.exec.is_none() {
                break;
            }
        }
    }

    async fn dispatch(&mut self, msg: Msg) {
        match msg.cmd {
            KtpCmd::Auth => {
                if self.state != DaemonState::Unauthorized && self.state != DaemonState::Idle {
                    return;
                }
                self.process_auth(&msg).await;
            }
            KtpCmd::Cmd => {
                if !self.check_authorized(KtpCmd::CmdAck).await {
                    return;
                }
                if self.state != DaemonState::Idle {
                    tracing::warn!("CMD while busy");
                    return;
                }
                self.process_cmd(&msg).await;
            }
            KtpCmd::Completion => {
                if !self.check_authorized(KtpCmd::CompletionAck).await {
                    return;
                }
                if self.state != DaemonState::Idle {
                    return;
                }
                self.process_completion(&msg).await;
            }
            KtpCmd::Help => {
                if !self.check_authorized(KtpCmd::HelpAck).await {
                    return;
                }
                if self.state != DaemonState::Idle {
                    return;
                }
                self.process_help(&msg).await;
            }
            KtpCmd::Stdin => {
                if self.state != DaemonState::WaitForProcess {
                    return;
                }
                let Some(data) = msg.param(ParamType::Line) else {
                    return;
                };
                if let Some(exec) = &self.exec {
                    if !exec.write_stdin(data.to_vec()).await {
                        tracing::debug!("stdin for a finished command");
                    }
                }
            }
            KtpCmd::StdinClose => {
                if let Some(exec) = &mut self.exec {
                    exec.close_stdin();
                }
            }
            KtpCmd::Notification => self.process_winch(&msg),
            other => {
                tracing::warn!("unsupported command {other:?}");
            }
        }
    }

    /// UNAUTHORIZED answers everything but AUTH with an error reply.
    async fn check_authorized(&mut self, ack: KtpCmd) -> bool {
        if self.state == DaemonState::Unauthorized {
            self.send_error(ack, "Session is not authorized").await;
            return false;
        }
        true
    }

    /// Hand-shake: no real authentication, the peer credentials already
    /// identified the user. Answers with prompt and hotkeys.
    async fn process_auth(&mut self, _msg: &Msg) {
        self.state = DaemonState::Idle;
        let mut ack = Msg::new(KtpCmd::AuthAck, Status::empty());
        ack.set_retcode(0);
        if let Some(prompt) = self.generate_prompt() {
            ack.add_str(ParamType::Prompt, &prompt);
        }
        self.add_hotkeys(&mut ack);
        self.send(ack).await;
    }

    async fn process_cmd(&mut self, msg: &Msg) {
        let Some(line) = msg.param_str(ParamType::Line) else {
            self.send_error(KtpCmd::CmdAck, "The line is not specified")
                .await;
            return;
        };
        let dry_run = msg.status.contains(Status::DRY_RUN);

        // An empty command runs no actions: ack without a retcode.
        if line.trim().is_empty() {
            let mut ack = Msg::new(KtpCmd::CmdAck, self.exit_status());
            if let Some(prompt) = self.generate_prompt() {
                ack.add_str(ParamType::Prompt, &prompt);
            }
            self.send(ack).await;
            return;
        }

        let pargvs =
            match parse_for_exec(&self.scheme, &self.plugins, &self.session, &line) {
                Ok(pargvs) => pargvs,
                Err(error) => {
                    let mut ack = Msg::new(KtpCmd::CmdAck, Status::ERROR);
                    ack.add_str(ParamType::Error, &error);
                    if let Some(prompt) = self.generate_prompt() {
                        ack.add_str(ParamType::Prompt, &prompt);
                    }
                    self.send(ack).await;
                    return;
                }
            };

        self.saved_path = self.session.path.levels().to_vec();
        self.session.apply_restore(&self.scheme, &pargvs[0]);
        self.cmd_pargv = pargvs.first().cloned();

        let path_names: Vec<String> = self
            .session
            .path
            .levels()
            .iter()
            .map(|id| self.scheme.name(*id).to_string())
            .collect();
        let kexec = match Kexec::prepare(
            Arc::clone(&self.scheme),
            Arc::clone(&self.plugins),
            self.session.info.clone(),
            path_names,
            pargvs,
            dry_run,
        ) {
            Ok(kexec) => kexec,
            Err(e) => {
                let mut ack = Msg::new(KtpCmd::CmdAck, Status::ERROR);
                ack.add_str(ParamType::Error, &e.to_string());
                self.send(ack).await;
                return;
            }
        };

        // Partial ack: the command is scheduled; announce its features
        // before the first output byte.
        let mut status = Status::INCOMPLETED;
        if kexec.interactive {
            status |= Status::INTERACTIVE;
        }
        if kexec.need_stdin {
            status |= Status::NEED_STDIN;
        }
        self.send(Msg::new(KtpCmd::CmdAck, status)).await;

        self.exec = Some(kexec.launch());
        self.state = DaemonState::WaitForProcess;
    }

    async fn on_exec_event(&mut self, event: KexecEvent) {
        match event {
            KexecEvent::Stdout(bytes) => {
                let mut msg = Msg::new(KtpCmd::Stdout, Status::empty());
                msg.add(ParamType::Line, bytes);
                self.send(msg).await;
            }
            KexecEvent::Stderr(bytes) => {
                let mut msg = Msg::new(KtpCmd::Stderr, Status::empty());
                msg.add(ParamType::Line, bytes);
                self.send(msg).await;
            }
            KexecEvent::Done(result) => self.finish_cmd(result).await,
        }
    }

    async fn finish_cmd(&mut self, result: KexecResult) {
        self.exec = None;
        self.state = DaemonState::Idle;
        self.session.apply_nav(&self.scheme, &result.nav);
        let view_changed = self.saved_path != self.session.path.levels();
        self.run_log_hook();

        let mut status = Status::empty();
        if self.session.done {
            self.exit = true;
            status |= Status::EXIT;
        }
        let mut ack = Msg::new(KtpCmd::CmdAck, status);
        ack.set_retcode(result.retcode);
        if let Some(prompt) = self.generate_prompt() {
            ack.add_str(ParamType::Prompt, &prompt);
        }
        if view_changed {
            self.add_hotkeys(&mut ack);
        }
        self.send(ack).await;
    }

    async fn process_completion(&mut self, msg: &Msg) {
        let Some(line) = msg.param_str(ParamType::Line) else {
            self.send_error(KtpCmd::CompletionAck, "The line is not specified")
                .await;
            return;
        };
        let Some(mut pargv) =
            parse_for_completion(&self.scheme, &self.plugins, &self.session, &line)
        else {
            self.send_error(KtpCmd::CompletionAck, "Can't parse the line")
                .await;
            return;
        };

        let mut ack = Msg::new(KtpCmd::CompletionAck, self.exit_status());

        // The last unfinished word is the common prefix of every
        // completion the generators may produce.
        let prefix = pargv.last_arg.clone().unwrap_or_default();
        if !prefix.is_empty() {
            ack.add_str(ParamType::Prefix, &prefix);
        }

        let mut variants: BTreeSet<String> = BTreeSet::new();
        let candidates = pargv.completions.clone();
        for candidate in candidates {
            // The candidate's own generator wins over its PTYPE's.
            let generator = self
                .scheme
                .purpose_child(candidate, EntryPurpose::Completion)
                .or_else(|| {
                    let ptype = self.scheme.purpose_child(candidate, EntryPurpose::Ptype)?;
                    self.scheme.purpose_child(ptype, EntryPurpose::Completion)
                });
            let Some(generator) = generator else {
                continue;
            };
            pargv.candidate = Some(Parg {
                entry: candidate,
                value: Some(prefix.clone()),
            });
            let Some((retcode, out)) = exec_locally(
                &self.scheme,
                &self.plugins,
                &self.session,
                generator,
                Some(&pargv),
            ) else {
                continue;
            };
            pargv.candidate = None;
            if retcode != 0 {
                continue;
            }
            for variant in out.lines() {
                // Only variants extending the prefix count; ship the
                // suffix the client has yet to type.
                if let Some(suffix) = variant.strip_prefix(&prefix) {
                    variants.insert(suffix.to_string());
                }
            }
        }
        for variant in &variants {
            ack.add_str(ParamType::Line, variant);
        }

        self.send(ack).await;
    }

    async fn process_help(&mut self, msg: &Msg) {
        let Some(line) = msg.param_str(ParamType::Line) else {
            self.send_error(KtpCmd::HelpAck, "The line is not specified")
                .await;
            return;
        };
        let Some(mut pargv) =
            parse_for_completion(&self.scheme, &self.plugins, &self.session, &line)
        else {
            self.send_error(KtpCmd::HelpAck, "Can't parse the line").await;
            return;
        };

        let mut ack = Msg::new(KtpCmd::HelpAck, self.exit_status());
        let prefix = pargv.last_arg.clone().unwrap_or_default();

        let mut items: Vec<(String, String)> = Vec::new();
        let candidates = pargv.completions.clone();
        for candidate in candidates {
            let ptype = self.scheme.purpose_child(candidate, EntryPurpose::Ptype);
            let generator = self
                .scheme
                .purpose_child(candidate, EntryPurpose::Help)
                .or_else(|| ptype.and_then(|p| self.scheme.purpose_child(p, EntryPurpose::Help)));

            let mut generated = false;
            if let Some(generator) = generator {
                pargv.candidate = Some(Parg {
                    entry: candidate,
                    value: Some(prefix.clone()),
                });
                if let Some((0, out)) = exec_locally(
                    &self.scheme,
                    &self.plugins,
                    &self.session,
                    generator,
                    Some(&pargv),
                ) {
                    let mut lines = out.lines();
                    while let (Some(prefix_str), Some(text)) = (lines.next(), lines.next()) {
                        items.push((prefix_str.to_string(), text.to_string()));
                        generated = true;
                    }
                }
                pargv.candidate = None;
            }

            // No generator output: synthesize from the available fields.
            if !generated {
                let prefix_str = match ptype {
                    Some(ptype) => self
                        .scheme
                        .help(ptype)
                        .unwrap_or_else(|| self.scheme.token_text(ptype)),
                    None => self.scheme.token_text(candidate),
                };
                let text = self
                    .scheme
                    .help(candidate)
                    .unwrap_or_else(|| self.scheme.token_text(candidate));
                items.push((prefix_str.to_string(), text.to_string()));
            }
        }

        items.sort();
        for (prefix_str, text) in &items {
            ack.add_str(ParamType::Prefix, prefix_str);
            ack.add_str(ParamType::Line, text);
        }
        self.send(ack).await;
    }

    /// The nearest LOG-purpose entry on the path records the executed
    /// command; its output is discarded, failures only traced.
    fn run_log_hook(&mut self) {
        let Some(pargv) = self.cmd_pargv.take() else {
            return;
        };
        for (_, view) in self.session.path.iter_deepest_first() {
            let Some(log_entry) = self.scheme.purpose_child(view, EntryPurpose::Log) else {
                continue;
            };
            let result = exec_locally(
                &self.scheme,
                &self.plugins,
                &self.session,
                log_entry,
                Some(&pargv),
            );
            if let Some((retcode, _)) = result {
                if retcode != 0 {
                    tracing::warn!(retcode, "log hook failed");
                }
            }
            break;
        }
    }

    fn process_winch(&mut self, msg: &Msg) {
        let Some((width, height)) = msg.winch() else {
            return;
        };
        self.session.info.term_width = width;
        self.session.info.term_height = height;
        if let Some(exec) = &self.exec {
            exec.set_winsize(width, height);
        }
    }

    /// Walk the path deepest-first; the first view with a usable PROMPT
    /// entry wins. Its actions run locally, the `value` is the fallback.
    fn generate_prompt(&self) -> Option<String> {
        for (_, view) in self.session.path.iter_deepest_first() {
            let Some(prompt_entry) = self.scheme.purpose_child(view, EntryPurpose::Prompt) else {
                continue;
            };
            if !self.scheme.actions(prompt_entry).is_empty() {
                if let Some((0, out)) = exec_locally(
                    &self.scheme,
                    &self.plugins,
                    &self.session,
                    prompt_entry,
                    None,
                ) {
                    if !out.is_empty() {
                        return Some(out);
                    }
                }
            }
            if let Some(value) = self.scheme.value(prompt_entry) {
                return Some(value.to_string());
            }
        }
        None
    }

    /// Hotkeys of every view on the path, deepest views taking priority
    /// on key conflicts.
    fn add_hotkeys(&self, msg: &mut Msg) {
        let mut seen: Vec<String> = Vec::new();
        for (_, view) in self.session.path.iter_deepest_first() {
            for hotkey in self.scheme.hotkeys(view) {
                if seen.contains(&hotkey.key) {
                    continue;
                }
                seen.push(hotkey.key.clone());
                msg.add_hotkey(&hotkey.key, &hotkey.cmd);
            }
        }
    }

    fn exit_status(&mut self) -> Status {
        if self.session.done {
            self.exit = true;
            Status::EXIT
        } else {
            Status::empty()
        }
    }

    async fn send(&mut self, msg: Msg) {
        if self.writer.send(msg).await.is_err() {
            self.exit = true;
        }
    }

    async fn send_error(&mut self, ack: KtpCmd, error: &str) {
        let mut msg = Msg::new(ack, Status::ERROR);
        msg.add_str(ParamType::Error, error);
        self.send(msg).await;
    }
}
