#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Read;
use std::sync::Arc;

use klish_core::ActionKind;
use klish_core::Context;
use klish_core::Iaction;
use klish_core::Ientry;
use klish_core::Ischeme;
use klish_core::Kexec;
use klish_core::KexecEvent;
use klish_core::Plugin;
use klish_core::PluginHost;
use klish_core::Scheme;
use klish_core::Session;
use klish_core::SessionInfo;
use klish_core::SymFn;
use klish_core::UNRESOLVED_SYM_RETCODE;
use klish_core::action_env;
use klish_core::parse_for_exec;
use pretty_assertions::assert_eq;

/// Writes the action script to the stage stdout.
fn sym_emit(ctx: &mut Context<'_>) -> i32 {
    let script = ctx.script().to_string();
    ctx.print(&script);
    0
}

/// Reads stage stdin to EOF and keeps lines containing the bound
/// `pattern` parameter.
fn sym_grep(ctx: &mut Context<'_>) -> i32 {
    let Some(stdio) = ctx.stdio else {
        return -1;
    };
    let Some(stdin) = &stdio.stdin else {
        return -1;
    };
    let Ok(dup) = stdin.try_clone() else {
        return -1;
    };
    let mut data = String::new();
    if std::fs::File::from(dup).read_to_string(&mut data).is_err() {
        return -1;
    }
    let pattern = ctx
        .pargv
        .map(|p| {
            p.values_of(ctx.scheme, "pattern")
                .first()
                .copied()
                .unwrap_or("")
                .to_string()
        })
        .unwrap_or_default();
    let mut matched = String::new();
    for line in data.lines() {
        if line.contains(&pattern) {
            matched.push_str(line);
            matched.push('\n');
        }
    }
    ctx.print(&matched);
    0
}

fn sym_fail3(_ctx: &mut Context<'_>) -> i32 {
    3
}

fn plugins_with_test_syms() -> PluginHost {
    let mut host = PluginHost::new();
    let mut plugin = Plugin::builtin("testsyms");
    plugin.add_sym("emit", SymFn::Builtin(sym_emit));
    plugin.add_sym("grep", SymFn::Builtin(sym_grep));
    plugin.add_sym("fail3", SymFn::Builtin(sym_fail3));
    host.add(plugin).unwrap();
    host
}

fn pipeline_scheme() -> Scheme {
    let show = Ientry::command("show", "Show state")
        .with_entry(Ientry::param("log", "/COMMAND"))
        .with_action(Iaction::sym("emit").with_script("warn: low disk\ninfo: all good\nwarn: fan\n"));
    let grep = Ientry {
        filter: Some("true".to_string()),
        ..Ientry::command("grep", "Filter lines")
    }
    .with_entry(Ientry::param("pattern", "/STRING"))
    .with_action(Iaction::sym("grep"));
    let root = Ientry::view("root").with_entry(show).with_entry(grep);
    Scheme::from_ischeme(&Ischeme {
        plugins: Vec::new(),
        entries: vec![root],
    })
    .unwrap()
}

async fn collect(
    running: &mut klish_core::RunningKexec,
) -> (Vec<u8>, Vec<u8>, klish_core::KexecResult) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        match running.events.recv().await {
            Some(KexecEvent::Stdout(chunk)) => stdout.extend_from_slice(&chunk),
            Some(KexecEvent::Stderr(chunk)) => stderr.extend_from_slice(&chunk),
            Some(KexecEvent::Done(result)) => return (stdout, stderr, result),
            None => panic!("kexec ended without a Done event"),
        }
    }
}

#[tokio::test]
async fn two_stage_pipeline_streams_through_the_filter() {
    let scheme = Arc::new(pipeline_scheme());
    let plugins = Arc::new(plugins_with_test_syms());
    let session = Session::new(&scheme, "root", SessionInfo::default()).unwrap();

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "show log | grep warn").unwrap();
    let kexec = Kexec::prepare(
        Arc::clone(&scheme),
        Arc::clone(&plugins),
        session.info.clone(),
        vec!["root".to_string()],
        pargvs,
        false,
    )
    .unwrap();
    assert_eq!(kexec.stage_count(), 2);
    assert!(!kexec.interactive);

    let mut running = kexec.launch();
    let (stdout, stderr, result) = collect(&mut running).await;
    assert_eq!(
        String::from_utf8_lossy(&stdout),
        "warn: low disk\nwarn: fan\n"
    );
    assert!(stderr.is_empty());
    assert_eq!(result.retcode, 0);
}

#[tokio::test]
async fn exec_on_gates_and_update_retcode() {
    // fail3 sets the running retcode to 3; the exec_on=fail action then
    // runs but leaves the retcode alone; the exec_on=success one is
    // skipped.
    let cmd = Ientry::command("try", "Run the gauntlet")
        .with_action(Iaction::sym("fail3"))
        .with_action(Iaction {
            exec_on: Some("fail".to_string()),
            update_retcode: Some(false),
            ..Iaction::sym("emit").with_script("recovering\n")
        })
        .with_action(Iaction {
            exec_on: Some("success".to_string()),
            ..Iaction::sym("emit").with_script("never printed\n")
        });
    let scheme = Arc::new(
        Scheme::from_ischeme(&Ischeme {
            plugins: Vec::new(),
            entries: vec![Ientry::view("root").with_entry(cmd)],
        })
        .unwrap(),
    );
    let plugins = Arc::new(plugins_with_test_syms());
    let session = Session::new(&scheme, "root", SessionInfo::default()).unwrap();

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "try").unwrap();
    let kexec = Kexec::prepare(
        Arc::clone(&scheme),
        Arc::clone(&plugins),
        session.info.clone(),
        vec!["root".to_string()],
        pargvs,
        false,
    )
    .unwrap();
    let mut running = kexec.launch();
    let (stdout, _stderr, result) = collect(&mut running).await;
    assert_eq!(String::from_utf8_lossy(&stdout), "recovering\n");
    assert_eq!(result.retcode, 3);
}

#[tokio::test]
async fn unresolved_sym_yields_sentinel_retcode() {
    let cmd = Ientry::command("ghost", "No such sym").with_action(Iaction::sym("no_such_sym"));
    let scheme = Arc::new(
        Scheme::from_ischeme(&Ischeme {
            plugins: Vec::new(),
            entries: vec![Ientry::view("root").with_entry(cmd)],
        })
        .unwrap(),
    );
    let plugins = Arc::new(PluginHost::new());
    let session = Session::new(&scheme, "root", SessionInfo::default()).unwrap();

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "ghost").unwrap();
    let kexec = Kexec::prepare(
        Arc::clone(&scheme),
        Arc::clone(&plugins),
        session.info.clone(),
        vec!["root".to_string()],
        pargvs,
        false,
    )
    .unwrap();
    let mut running = kexec.launch();
    let (_stdout, _stderr, result) = collect(&mut running).await;
    assert_eq!(result.retcode, UNRESOLVED_SYM_RETCODE);
}

#[tokio::test]
async fn dry_run_skips_everything_but_permanent_actions() {
    let cmd = Ientry::command("deploy", "Deploy the config")
        .with_action(Iaction {
            permanent: Some(true),
            ..Iaction::sym("emit").with_script("audit\n")
        })
        .with_action(Iaction::sym("fail3"));
    let scheme = Arc::new(
        Scheme::from_ischeme(&Ischeme {
            plugins: Vec::new(),
            entries: vec![Ientry::view("root").with_entry(cmd)],
        })
        .unwrap(),
    );
    let plugins = Arc::new(plugins_with_test_syms());
    let session = Session::new(&scheme, "root", SessionInfo::default()).unwrap();

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "deploy").unwrap();
    let kexec = Kexec::prepare(
        Arc::clone(&scheme),
        Arc::clone(&plugins),
        session.info.clone(),
        vec!["root".to_string()],
        pargvs,
        true,
    )
    .unwrap();
    let mut running = kexec.launch();
    let (stdout, _stderr, result) = collect(&mut running).await;
    // The permanent action ran; the retcode-3 one was skipped.
    assert_eq!(String::from_utf8_lossy(&stdout), "audit\n");
    assert_eq!(result.retcode, 0);
}

#[tokio::test]
async fn interactive_stage_runs_on_a_pty() {
    let cmd = Ientry {
        interactive: Some(true),
        ..Ientry::command("shell", "Interactive shell")
    }
    .with_action(Iaction::sym("emit").with_script("pty says hi\n"));
    let scheme = Arc::new(
        Scheme::from_ischeme(&Ischeme {
            plugins: Vec::new(),
            entries: vec![Ientry::view("root").with_entry(cmd)],
        })
        .unwrap(),
    );
    let plugins = Arc::new(plugins_with_test_syms());
    let session = Session::new(&scheme, "root", SessionInfo::default()).unwrap();

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "shell").unwrap();
    let kexec = Kexec::prepare(
        Arc::clone(&scheme),
        Arc::clone(&plugins),
        session.info.clone(),
        vec!["root".to_string()],
        pargvs,
        false,
    )
    .unwrap();
    assert!(kexec.interactive);
    assert!(kexec.need_stdin);

    let mut running = kexec.launch();
    let (stdout, _stderr, result) = collect(&mut running).await;
    // The pty line discipline may rewrite line endings; the payload text
    // must still arrive on the master side.
    assert!(String::from_utf8_lossy(&stdout).contains("pty says hi"));
    assert_eq!(result.retcode, 0);
}

#[test]
fn env_population_is_idempotent_and_indexed() {
    let cmd = Ientry::command("send", "Send packets")
        .with_entry(Ientry {
            min: Some(0),
            max: Some(3),
            ..Ientry::param("dest", "/STRING")
        })
        .with_action(Iaction::sym("nop"));
    let scheme = Scheme::from_ischeme(&Ischeme {
        plugins: Vec::new(),
        entries: vec![Ientry::view("root").with_entry(cmd)],
    })
    .unwrap();
    let plugins = PluginHost::new();
    let info = SessionInfo {
        user: "admin".to_string(),
        uid: 1000,
        ..SessionInfo::default()
    };
    let session = Session::new(&scheme, "root", info).unwrap();

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "send one two three").unwrap();
    let pargv = &pargvs[0];

    let ctx = Context {
        kind: ActionKind::Action,
        scheme: &scheme,
        session: &session.info,
        path_names: &["root".to_string()],
        pargv: Some(pargv),
        parent_pargv: None,
        entry: pargv.command,
        script: None,
        dry_run: false,
        out: Vec::new(),
        err: Vec::new(),
        stdio: None,
        nav: Vec::new(),
    };

    let env = action_env(&ctx);
    assert_eq!(env.get("KLISH_TYPE").map(String::as_str), Some("action"));
    assert_eq!(env.get("KLISH_COMMAND").map(String::as_str), Some("send"));
    assert_eq!(env.get("KLISH_USER").map(String::as_str), Some("admin"));
    assert_eq!(env.get("KLISH_UID").map(String::as_str), Some("1000"));
    assert_eq!(env.get("KLISH_PARAM_dest").map(String::as_str), Some("one"));
    assert_eq!(env.get("KLISH_PARAM_dest_0").map(String::as_str), Some("one"));
    assert_eq!(env.get("KLISH_PARAM_dest_1").map(String::as_str), Some("two"));
    assert_eq!(
        env.get("KLISH_PARAM_dest_2").map(String::as_str),
        Some("three")
    );
    // The command itself binds too.
    assert_eq!(env.get("KLISH_PARAM_send").map(String::as_str), Some("send"));

    // Idempotent: a second population is byte-identical.
    let again = action_env(&ctx);
    assert_eq!(env, again);
}
