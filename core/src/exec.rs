//! Action execution: the per-pipeline kexec plan plus the shared
//! sequential action runner used by service actions.
//!
//! Stage stdio is a chain of anonymous pipes; the first stage's stdin and
//! the last stage's stdout are the pipeline's external endpoints and all
//! stages share one stderr. A stage that demands a tty gets a
//! pseudo-terminal instead of the pipe triple (the parser already limits
//! such pipelines to a single stage). Stages run concurrently on blocking
//! workers; the async side pumps the external ends.

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::action::ActionIo;
use crate::context::ActionKind;
use crate::context::Context;
use crate::context::NavOp;
use crate::context::StageStdio;
use crate::entry::EntryId;
use crate::pargv::Parg;
use crate::pargv::ParsePurpose;
use crate::pargv::ParseStatus;
use crate::pargv::Pargv;
use crate::plugin::PluginHost;
use crate::scheme::Scheme;
use crate::session::SessionInfo;

/// Running retcode set when an action's sym can't be resolved.
pub const UNRESOLVED_SYM_RETCODE: i32 = 127;

const PUMP_CHUNK: usize = 4096;
const EVENT_QUEUE: usize = 64;

pub(crate) struct ActionRunOutcome {
    pub retcode: i32,
    pub out: Vec<u8>,
    pub err: Vec<u8>,
    pub nav: Vec<NavOp>,
}

/// Run an entry's actions in declaration order against a running retcode.
/// With `stdio` present, captured output is flushed into the stage
/// descriptors after every action; otherwise it accumulates in the
/// outcome (the captured-stdout mode service actions use).
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_actions(
    scheme: &Scheme,
    plugins: &PluginHost,
    info: &SessionInfo,
    path_names: &[String],
    entry: EntryId,
    kind: ActionKind,
    pargv: &Pargv,
    parent_pargv: Option<&Pargv>,
    dry_run: bool,
    stdio: Option<&StageStdio>,
) -> ActionRunOutcome {
    let mut outcome = ActionRunOutcome {
        retcode: 0,
        out: Vec::new(),
        err: Vec::new(),
        nav: Vec::new(),
    };

    for action in scheme.actions(entry) {
        if !action.meets_exec_on(outcome.retcode) {
            continue;
        }
        if dry_run && !action.permanent.resolve(false) {
            continue;
        }
        let sym = match plugins.find_sym(&action.sym_ref) {
            Ok(sym) => sym,
            Err(_) => {
                tracing::warn!(sym = %action.sym_ref, "unresolved action symbol");
                if action.update_retcode {
                    outcome.retcode = UNRESOLVED_SYM_RETCODE;
                }
                continue;
            }
        };

        let mut ctx = Context {
            kind,
            scheme,
            session: info,
            path_names,
            pargv: Some(pargv),
            parent_pargv,
            entry: Some(entry),
            script: action.script.clone(),
            dry_run,
            out: Vec::new(),
            err: Vec::new(),
            stdio,
            nav: Vec::new(),
        };
        let rc = sym.func.call(&mut ctx);
        outcome.nav.append(&mut ctx.nav);

        match stdio {
            Some(stdio) => {
                flush_to_fd(stdio.stdout.as_ref(), &ctx.out);
                flush_to_fd(stdio.stderr.as_ref(), &ctx.err);
            }
            None => {
                outcome.out.extend_from_slice(&ctx.out);
                outcome.err.extend_from_slice(&ctx.err);
            }
        }

        if action.update_retcode {
            outcome.retcode = rc;
        }
    }

    outcome
}

/// A closed downstream is not an error: the pipeline runs to completion.
fn flush_to_fd(fd: Option<&OwnedFd>, data: &[u8]) {
    let Some(fd) = fd else {
        return;
    };
    if data.is_empty() {
        return;
    }
    let Ok(dup) = fd.try_clone() else {
        return;
    };
    let mut file = File::from(dup);
    let _ = file.write_all(data);
}

/// Run a service entry (PTYPE validator, completion/help/prompt
/// generator) synchronously with captured stdout. Returns `None` when the
/// entry carries no actions.
pub(crate) fn run_service(
    scheme: &Scheme,
    plugins: &PluginHost,
    info: &SessionInfo,
    path_names: &[String],
    entry: EntryId,
    parent_pargv: Option<&Pargv>,
) -> Option<(i32, String)> {
    if scheme.actions(entry).is_empty() {
        return None;
    }
    let mut pargv = Pargv::new(ParsePurpose::Exec, false);
    pargv.pargs.push(Parg { entry, value: None });
    pargv.command = Some(entry);
    pargv.status = ParseStatus::Ok;

    let outcome = run_actions(
        scheme,
        plugins,
        info,
        path_names,
        entry,
        ActionKind::ServiceAction,
        &pargv,
        parent_pargv,
        false,
        None,
    );
    if !outcome.nav.is_empty() {
        tracing::debug!("service action navigation request ignored");
    }
    Some((
        outcome.retcode,
        String::from_utf8_lossy(&outcome.out).into_owned(),
    ))
}

#[derive(Debug)]
pub enum KexecEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Done(KexecResult),
}

#[derive(Debug, Clone)]
pub struct KexecResult {
    /// Retcode of the last pipeline stage.
    pub retcode: i32,
    /// Navigation requests recorded by the actions, to be applied to the
    /// session by its owner.
    pub nav: Vec<NavOp>,
}

struct Stage {
    pargv: Pargv,
    stdio: StageStdio,
}

/// A prepared execution plan: stage stdio wired, not yet running.
pub struct Kexec {
    scheme: Arc<Scheme>,
    plugins: Arc<PluginHost>,
    info: SessionInfo,
    path_names: Vec<String>,
    stages: Vec<Stage>,
    dry_run: bool,
    pub interactive: bool,
    pub need_stdin: bool,
    stdin_fd: Option<OwnedFd>,
    stdout_fd: Option<OwnedFd>,
    stderr_fd: Option<OwnedFd>,
    pty_master: Option<OwnedFd>,
}

impl Kexec {
    pub fn prepare(
        scheme: Arc<Scheme>,
        plugins: Arc<PluginHost>,
        info: SessionInfo,
        path_names: Vec<String>,
        pargvs: Vec<Pargv>,
        dry_run: bool,
    ) -> std::io::Result<Self> {
        if pargvs.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty pipeline",
            ));
        }

        let mut interactive = false;
        let mut need_stdin = false;
        for pargv in &pargvs {
            let Some(cmd) = pargv.command else {
                continue;
            };
            if scheme.interactive(cmd)
                || scheme.io_in(cmd) == ActionIo::Tty
                || scheme.io_out(cmd) == ActionIo::Tty
            {
                interactive = true;
            }
            if scheme.io_in(cmd) != ActionIo::False {
                need_stdin = true;
            }
        }
        if interactive {
            need_stdin = true;
        }

        let mut stages: Vec<Stage> = pargvs
            .into_iter()
            .map(|pargv| Stage {
                pargv,
                stdio: StageStdio::default(),
            })
            .collect();

        let kexec = if interactive {
            if stages.len() != 1 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "an interactive command can't be piped",
                ));
            }
            let (master, slave) = open_pty(info.term_width, info.term_height)?;
            let stage = &mut stages[0];
            stage.stdio.stdin = Some(slave.try_clone()?);
            stage.stdio.stdout = Some(slave.try_clone()?);
            stage.stdio.stderr = Some(slave);
            Self {
                scheme,
                plugins,
                info,
                path_names,
                stages,
                dry_run,
                interactive,
                need_stdin,
                stdin_fd: None,
                stdout_fd: None,
                stderr_fd: None,
                pty_master: Some(master),
            }
        } else {
            // External stdin feeds the first stage.
            let (stdin_read, stdin_write) = os_pipe::pipe()?;
            stages[0].stdio.stdin = Some(stdin_read.into());
            // The last stage's stdout is the pipeline's output.
            let (stdout_read, stdout_write) = os_pipe::pipe()?;
            let last = stages.len() - 1;
            stages[last].stdio.stdout = Some(stdout_write.into());
            // One shared stderr.
            let (stderr_read, stderr_write) = os_pipe::pipe()?;
            let stderr_write: OwnedFd = stderr_write.into();
            for stage in &mut stages {
                stage.stdio.stderr = Some(stderr_write.try_clone()?);
            }
            drop(stderr_write);
            // Pipes between neighbor stages.
            for i in 0..stages.len() - 1 {
                let (read, write) = os_pipe::pipe()?;
                stages[i].stdio.stdout = Some(write.into());
                stages[i + 1].stdio.stdin = Some(read.into());
            }
            Self {
                scheme,
                plugins,
                info,
                path_names,
                stages,
                dry_run,
                interactive,
                need_stdin,
                stdin_fd: Some(stdin_write.into()),
                stdout_fd: Some(stdout_read.into()),
                stderr_fd: Some(stderr_read.into()),
                pty_master: None,
            }
        };

        Ok(kexec)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Start every stage and the stream pumps. Consumes the plan.
    pub fn launch(self) -> RunningKexec {
        let (ev_tx, ev_rx) = mpsc::channel::<KexecEvent>(EVENT_QUEUE);

        // Stdin feeder: inbound buffers drain into the first stage (or the
        // pty master) on a blocking writer.
        let stdin_target = if self.interactive {
            self.pty_master.as_ref().and_then(|fd| fd.try_clone().ok())
        } else {
            self.stdin_fd
        };
        let stdin_tx = stdin_target.map(spawn_stdin_writer);

        // Output pumps.
        let mut pump_handles = Vec::new();
        if let Some(fd) = self.stdout_fd {
            pump_handles.push(spawn_pump(fd, ev_tx.clone(), false));
        }
        if let Some(fd) = self.stderr_fd {
            pump_handles.push(spawn_pump(fd, ev_tx.clone(), true));
        }
        let winch_fd = self.pty_master;
        if let Some(master) = &winch_fd {
            if let Ok(dup) = master.try_clone() {
                pump_handles.push(spawn_pump(dup, ev_tx.clone(), false));
            }
        }

        // Stage workers. Each runs its actions sequentially; stages run
        // concurrently so filters can stream.
        let mut stage_handles = Vec::new();
        for stage in self.stages {
            let scheme = Arc::clone(&self.scheme);
            let plugins = Arc::clone(&self.plugins);
            let info = self.info.clone();
            let path_names = self.path_names.clone();
            let dry_run = self.dry_run;
            stage_handles.push(tokio::task::spawn_blocking(move || {
                run_stage(&scheme, &plugins, &info, &path_names, stage, dry_run)
            }));
        }

        let interactive = self.interactive;
        let need_stdin = self.need_stdin;
        tokio::spawn(async move {
            let mut retcode = 0;
            let mut nav = Vec::new();
            for handle in stage_handles {
                match handle.await {
                    Ok((rc, mut stage_nav)) => {
                        retcode = rc;
                        nav.append(&mut stage_nav);
                    }
                    Err(e) => {
                        tracing::error!("stage worker failed: {e}");
                        retcode = -1;
                    }
                }
            }
            // Drain the pumps before the final event so no output follows
            // the command's completion.
            for pump in pump_handles {
                let _ = pump.await;
            }
            let _ = ev_tx.send(KexecEvent::Done(KexecResult { retcode, nav })).await;
        });

        RunningKexec {
            events: ev_rx,
            stdin_tx,
            winch_fd,
            interactive,
            need_stdin,
        }
    }
}

/// A launched pipeline: consume [`RunningKexec::events`] until
/// [`KexecEvent::Done`].
pub struct RunningKexec {
    pub events: mpsc::Receiver<KexecEvent>,
    stdin_tx: Option<mpsc::Sender<Vec<u8>>>,
    winch_fd: Option<OwnedFd>,
    pub interactive: bool,
    pub need_stdin: bool,
}

impl RunningKexec {
    /// Queue bytes for the pipeline's stdin. Returns false once stdin is
    /// closed or was never open.
    pub async fn write_stdin(&self, bytes: Vec<u8>) -> bool {
        match &self.stdin_tx {
            Some(tx) => tx.send(bytes).await.is_ok(),
            None => false,
        }
    }

    /// Close the pipeline's stdin (EOF for the first stage).
    pub fn close_stdin(&mut self) {
        self.stdin_tx = None;
    }

    /// Propagate a window-size change to the pty, if any.
    pub fn set_winsize(&self, width: u16, height: u16) {
        if let Some(fd) = &self.winch_fd {
            set_winsize(fd, width, height);
        }
    }
}

fn run_stage(
    scheme: &Scheme,
    plugins: &PluginHost,
    info: &SessionInfo,
    path_names: &[String],
    stage: Stage,
    dry_run: bool,
) -> (i32, Vec<NavOp>) {
    let Some(cmd) = stage.pargv.command else {
        return (0, Vec::new());
    };
    let outcome = run_actions(
        scheme,
        plugins,
        info,
        path_names,
        cmd,
        ActionKind::Action,
        &stage.pargv,
        None,
        dry_run,
        Some(&stage.stdio),
    );
    (outcome.retcode, outcome.nav)
}

fn spawn_stdin_writer(fd: OwnedFd) -> mpsc::Sender<Vec<u8>> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(EVENT_QUEUE);
    tokio::task::spawn_blocking(move || {
        let mut file = File::from(fd);
        while let Some(bytes) = rx.blocking_recv() {
            if file.write_all(&bytes).is_err() {
                break;
            }
        }
    });
    tx
}

fn spawn_pump(fd: OwnedFd, ev_tx: mpsc::Sender<KexecEvent>, is_stderr: bool) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut file = File::from(fd);
        let mut buf = [0u8; PUMP_CHUNK];
        loop {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = buf[..n].to_vec();
                    let event = if is_stderr {
                        KexecEvent::Stderr(chunk)
                    } else {
                        KexecEvent::Stdout(chunk)
                    };
                    if ev_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                // A pty master reports EIO once the slave side is gone.
                Err(_) => break,
            }
        }
    })
}

fn open_pty(width: u16, height: u16) -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut master: libc::c_int = -1;
    let mut slave: libc::c_int = -1;
    let mut winsize = libc::winsize {
        ws_row: height,
        ws_col: width,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let rc = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            &mut winsize,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(master), OwnedFd::from_raw_fd(slave)) })
}

fn set_winsize(fd: &OwnedFd, width: u16, height: u16) {
    let winsize = libc::winsize {
        ws_row: height,
        ws_col: width,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let rc = unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCSWINSZ, &winsize) };
    if rc != 0 {
        tracing::warn!("TIOCSWINSZ failed: {}", std::io::Error::last_os_error());
    }
}
