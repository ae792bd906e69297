#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use klish_core::Iaction;
use klish_core::Ientry;
use klish_core::Ischeme;
use klish_core::Kexec;
use klish_core::KexecEvent;
use klish_core::ParseStatus;
use klish_core::PluginHost;
use klish_core::Scheme;
use klish_core::Session;
use klish_core::SessionInfo;
use klish_core::parse_for_completion;
use klish_core::parse_for_exec;
use klish_core::split_line;
use klish_core::split_pipes;
use pretty_assertions::assert_eq;

/// Test scheme: a root view with a few commands, a nested view and the
/// navigation pieces the seed scenarios need.
fn test_scheme() -> Scheme {
    let root = Ientry::view("root")
        .with_entry(Ientry::command("help", "Show help").with_action(Iaction::sym("nop")))
        .with_entry(Ientry::command("ping", "Send echo request").with_action(Iaction::sym("nop")))
        .with_entry(Ientry::command("pong", "Reply to echo").with_action(Iaction::sym("nop")))
        .with_entry(
            Ientry::command("set", "Set parameters")
                .with_entry(
                    Ientry::param("port", "/COMMAND")
                        .with_entry(Ientry::param("value", "/UINT 1 65535")),
                )
                .with_action(Iaction::sym("nop")),
        )
        .with_entry(
            Ientry::command("enter", "Enter a view").with_entry(
                Ientry::param("system", "/COMMAND")
                    .with_action(Iaction::sym("nav").with_script("push system")),
            ),
        )
        .with_entry(Ientry {
            interactive: Some(true),
            ..Ientry::command("vi", "Edit interactively")
        }
        .with_action(Iaction::sym("nop")));

    let system = Ientry::view("system")
        .with_entry(
            Ientry::command("exit", "Leave the view")
                .with_action(Iaction::sym("nav").with_script("pop")),
        )
        .with_entry(Ientry {
            restore: Some(true),
            ..Ientry::command("reload", "Reload and drop back")
        }
        .with_action(Iaction::sym("nop")));

    let show = Ientry::command("show", "Show state")
        .with_entry(Ientry::param("log", "/COMMAND"))
        .with_action(Iaction::sym("nop"));
    let grep = Ientry {
        filter: Some("true".to_string()),
        ..Ientry::command("grep", "Filter lines")
    }
    .with_entry(Ientry::param("pattern", "/STRING"))
    .with_action(Iaction::sym("nop"));

    let root = root.with_entry(show).with_entry(grep);
    Scheme::from_ischeme(&Ischeme {
        plugins: Vec::new(),
        entries: vec![root, system],
    })
    .unwrap()
}

fn new_session(scheme: &Scheme) -> Session {
    Session::new(scheme, "root", SessionInfo::default()).unwrap()
}

#[test]
fn simple_command_parses_ok() {
    let scheme = test_scheme();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "help").unwrap();
    assert_eq!(pargvs.len(), 1);
    let pargv = &pargvs[0];
    assert_eq!(pargv.status, ParseStatus::Ok);
    let cmd = pargv.command.unwrap();
    assert_eq!(scheme.name(cmd), "help");
    assert_eq!(pargv.pargs.len(), 1);
}

#[test]
fn uint_parameter_validation() {
    let scheme = test_scheme();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "set port 80").unwrap();
    let pargv = &pargvs[0];
    assert_eq!(pargv.status, ParseStatus::Ok);
    assert_eq!(pargv.values_of(&scheme, "value"), vec!["80"]);

    let err = parse_for_exec(&scheme, &plugins, &session, "set port 70000").unwrap_err();
    assert_eq!(err, "Illegal command");

    let err = parse_for_exec(&scheme, &plugins, &session, "set port abc").unwrap_err();
    assert_eq!(err, "Illegal command");
}

#[test]
fn ambiguous_completion_collects_both() {
    let scheme = test_scheme();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    let pargv = parse_for_completion(&scheme, &plugins, &session, "p").unwrap();
    assert_eq!(pargv.status, ParseStatus::Incompleted);
    assert_eq!(pargv.last_arg.as_deref(), Some("p"));
    let mut names: Vec<&str> = pargv
        .completions
        .iter()
        .map(|id| scheme.name(*id))
        .collect();
    names.retain(|n| n.starts_with('p'));
    assert_eq!(names, vec!["ping", "pong"]);
}

#[test]
fn completion_after_full_token_offers_next() {
    let scheme = test_scheme();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    let pargv = parse_for_completion(&scheme, &plugins, &session, "set ").unwrap();
    assert_eq!(pargv.status, ParseStatus::Incompleted);
    assert_eq!(pargv.last_arg, None);
    let names: Vec<&str> = pargv
        .completions
        .iter()
        .map(|id| scheme.name(*id))
        .collect();
    assert_eq!(names, vec!["port"]);
}

#[test]
fn pipe_splitting_rules() {
    assert_eq!(split_pipes("show log | grep warn").unwrap().len(), 2);
    assert!(split_pipes("| grep warn").unwrap_err().contains("first position"));
    assert!(split_pipes("show log |").unwrap_err().contains("last argument"));
    // A trailing pipe with a space is fine: completion offers filters.
    let stages = split_pipes("show log | ").unwrap();
    assert_eq!(stages.len(), 2);
    assert!(stages[1].is_empty());
}

#[test]
fn filter_rules_enforced() {
    let scheme = test_scheme();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    let pargvs = parse_for_exec(&scheme, &plugins, &session, "show log | grep warn").unwrap();
    assert_eq!(pargvs.len(), 2);

    // A filter can't start a pipeline.
    let err = parse_for_exec(&scheme, &plugins, &session, "grep warn").unwrap_err();
    assert!(err.contains("grep"), "{err}");
    assert!(err.contains("without previous pipeline"), "{err}");

    // A non-filter can't be a pipe destination.
    let err = parse_for_exec(&scheme, &plugins, &session, "show log | ping").unwrap_err();
    assert!(err.contains("ping"), "{err}");
}

#[test]
fn interactive_command_rejects_pipes() {
    let scheme = test_scheme();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    let err = parse_for_exec(&scheme, &plugins, &session, "vi | grep foo").unwrap_err();
    assert!(err.contains("vi"), "{err}");
}

#[test]
fn unknown_command_is_illegal() {
    let scheme = test_scheme();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    let err = parse_for_exec(&scheme, &plugins, &session, "frobnicate").unwrap_err();
    assert_eq!(err, "Illegal command");
}

#[test]
fn parsing_is_deterministic() {
    let scheme = test_scheme();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    for line in ["help", "set port 80", "show log | grep warn", "set port abc"] {
        let first = parse_for_exec(&scheme, &plugins, &session, line);
        let second = parse_for_exec(&scheme, &plugins, &session, line);
        match (first, second) {
            (Ok(a), Ok(b)) => assert_eq!(a, b, "{line}"),
            (Err(a), Err(b)) => assert_eq!(a, b, "{line}"),
            (a, b) => panic!("nondeterministic outcome for {line}: {a:?} vs {b:?}"),
        }
    }
}

#[test]
fn parser_terminates_on_adversarial_input() {
    // Deeply nested optional parameters plus repeated tokens exercise the
    // bounce-back machinery; the call must return, not spin.
    let mut cmd = Ientry::command("walk", "Deeply nested").with_action(Iaction::sym("nop"));
    for i in 0..8 {
        cmd = cmd.with_entry(Ientry {
            min: Some(0),
            max: Some(3),
            ..Ientry::param(&format!("opt{i}"), "/STRING")
        });
    }
    let scheme = Scheme::from_ischeme(&Ischeme {
        plugins: Vec::new(),
        entries: vec![Ientry::view("root").with_entry(cmd)],
    })
    .unwrap();
    let plugins = PluginHost::new();
    let session = new_session(&scheme);

    let line = format!("walk {}", vec!["tok"; 30].join(" "));
    let result = parse_for_exec(&scheme, &plugins, &session, &line);
    // Optional params absorb up to 24 tokens; 30 leave trailing garbage.
    assert!(result.is_err());

    let line = format!("walk {}", vec!["tok"; 10].join(" "));
    let pargvs = parse_for_exec(&scheme, &plugins, &session, &line).unwrap();
    assert_eq!(pargvs[0].status, ParseStatus::Ok);
}

#[tokio::test]
async fn view_push_and_restore() {
    let scheme = Arc::new(test_scheme());
    let plugins = Arc::new(PluginHost::new());
    let mut session = new_session(&scheme);

    run_line(&scheme, &plugins, &mut session, "enter system").await;
    let names: Vec<&str> = session
        .path
        .levels()
        .iter()
        .map(|id| scheme.name(*id))
        .collect();
    assert_eq!(names, vec!["root", "system"]);

    run_line(&scheme, &plugins, &mut session, "reload").await;
    let names: Vec<&str> = session
        .path
        .levels()
        .iter()
        .map(|id| scheme.name(*id))
        .collect();
    assert_eq!(names, vec!["root"]);
}

#[tokio::test]
async fn exit_pops_one_level() {
    let scheme = Arc::new(test_scheme());
    let plugins = Arc::new(PluginHost::new());
    let mut session = new_session(&scheme);

    run_line(&scheme, &plugins, &mut session, "enter system").await;
    run_line(&scheme, &plugins, &mut session, "exit").await;
    assert_eq!(session.path.len(), 1);
}

/// Parse, honor `restore`, execute, apply navigation: the daemon's command
/// flow in miniature.
async fn run_line(
    scheme: &Arc<Scheme>,
    plugins: &Arc<PluginHost>,
    session: &mut Session,
    line: &str,
) -> i32 {
    let pargvs = parse_for_exec(scheme, plugins, session, line).unwrap();
    session.apply_restore(scheme, &pargvs[0]);
    let path_names: Vec<String> = session
        .path
        .levels()
        .iter()
        .map(|id| scheme.name(*id).to_string())
        .collect();
    let kexec = Kexec::prepare(
        Arc::clone(scheme),
        Arc::clone(plugins),
        session.info.clone(),
        path_names,
        pargvs,
        false,
    )
    .unwrap();
    let mut running = kexec.launch();
    loop {
        match running.events.recv().await {
            Some(KexecEvent::Done(result)) => {
                session.apply_nav(scheme, &result.nav);
                return result.retcode;
            }
            Some(_) => continue,
            None => panic!("kexec ended without a Done event"),
        }
    }
}

#[test]
fn tokenizer_handles_empty_input_stage() {
    // An empty line parses to one empty stage and no tokens.
    let stages = split_pipes("").unwrap();
    assert_eq!(stages.len(), 1);
    assert!(stages[0].is_empty());
    assert!(!split_line("").continuable);
}
