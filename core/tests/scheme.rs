#![allow(clippy::unwrap_used, clippy::expect_used)]

use klish_core::EntryMode;
use klish_core::EntryPurpose;
use klish_core::Iaction;
use klish_core::Ientry;
use klish_core::Ischeme;
use klish_core::KlishError;
use klish_core::Scheme;
use pretty_assertions::assert_eq;

fn load(entries: Vec<Ientry>) -> Result<Scheme, KlishError> {
    Scheme::from_ischeme(&Ischeme {
        plugins: Vec::new(),
        entries,
    })
}

#[test]
fn default_ptypes_always_registered() {
    let scheme = load(Vec::new()).unwrap();
    for name in ["COMMAND", "COMMAND_CASE", "INT", "UINT", "STRING"] {
        let id = scheme.find_by_path(&format!("/{name}")).unwrap();
        assert_eq!(scheme.purpose(id), EntryPurpose::Ptype);
        assert!(!scheme.actions(id).is_empty(), "{name} has a validator");
    }
    // COMMAND carries completion and help generators.
    let command = scheme.find_root("COMMAND").unwrap();
    assert!(scheme.purpose_child(command, EntryPurpose::Completion).is_some());
    assert!(scheme.purpose_child(command, EntryPurpose::Help).is_some());
}

#[test]
fn duplicate_views_merge() {
    let scheme = load(vec![
        Ientry::view("main")
            .with_entry(Ientry::command("ping", "Send echo request").with_action(Iaction::sym("nop"))),
        Ientry::view("main")
            .with_entry(Ientry::command("pong", "Reply echo").with_action(Iaction::sym("nop"))),
    ])
    .unwrap();
    let main = scheme.find_root("main").unwrap();
    assert!(scheme.find_child(main, "ping").is_some());
    assert!(scheme.find_child(main, "pong").is_some());
}

#[test]
fn view_named_like_a_builtin_ptype_is_an_error() {
    // The default PTYPEs are registered first; a user view must not
    // silently merge into one of them.
    let err = load(vec![
        Ientry::view("COMMAND")
            .with_entry(Ientry::command("ping", "Send echo request").with_action(Iaction::sym("nop"))),
    ])
    .unwrap_err();
    let KlishError::SchemeLoad(diags) = err else {
        panic!("expected load diagnostics");
    };
    assert!(diags.iter().any(|d| d.contains("different kind")), "{diags:?}");
    // The builtin PTYPE itself is untouched by the rejected merge.
    for name in ["INT", "UINT", "STRING", "COMMAND_CASE"] {
        let err = load(vec![Ientry::view(name)]).unwrap_err();
        let KlishError::SchemeLoad(diags) = err else {
            panic!("expected load diagnostics");
        };
        assert!(diags.iter().any(|d| d.contains("different kind")), "{diags:?}");
    }
}

#[test]
fn root_collision_between_view_and_command_is_an_error() {
    let err = load(vec![
        Ientry::view("main"),
        Ientry::command("main", "Not a view").with_action(Iaction::sym("nop")),
    ])
    .unwrap_err();
    let KlishError::SchemeLoad(diags) = err else {
        panic!("expected load diagnostics");
    };
    assert!(diags.iter().any(|d| d.contains("different kind")), "{diags:?}");
}

#[test]
fn rejected_root_merge_leaves_the_builtin_intact() {
    // A colliding load fails as a whole, but the diagnostic path must not
    // have grafted user children into the builtin subtree first.
    let err = load(vec![Ientry {
        purpose: Some("ptype".to_string()),
        actions: vec![Iaction::sym("STRING")],
        ..Ientry::named("COMMAND")
    }])
    .unwrap_err();
    let KlishError::SchemeLoad(diags) = err else {
        panic!("expected load diagnostics");
    };
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert!(diags[0].contains("different kind"), "{diags:?}");
}

#[test]
fn duplicate_nested_entries_are_errors() {
    let err = load(vec![
        Ientry::view("main")
            .with_entry(Ientry::command("ping", "one").with_action(Iaction::sym("nop")))
            .with_entry(Ientry::command("ping", "two").with_action(Iaction::sym("nop"))),
    ])
    .unwrap_err();
    let KlishError::SchemeLoad(diags) = err else {
        panic!("expected load diagnostics");
    };
    assert!(diags.iter().any(|d| d.contains("duplicate")), "{diags:?}");
}

#[test]
fn load_accumulates_every_error() {
    let err = load(vec![
        Ientry::view("main")
            .with_entry(Ientry {
                // No name.
                help: Some("nameless".to_string()),
                ..Ientry::default()
            })
            .with_entry(Ientry {
                name: Some("broken".to_string()),
                // Action without sym.
                actions: vec![Iaction::default()],
                mode: Some("sideways".to_string()),
                ..Ientry::default()
            }),
    ])
    .unwrap_err();
    let KlishError::SchemeLoad(diags) = err else {
        panic!("expected load diagnostics");
    };
    assert!(diags.iter().any(|d| d.contains("'name'")), "{diags:?}");
    assert!(diags.iter().any(|d| d.contains("'sym'")), "{diags:?}");
    assert!(diags.iter().any(|d| d.contains("'mode'")), "{diags:?}");
    assert_eq!(diags.len(), 3);
}

#[test]
fn dangling_reference_is_reported() {
    let err = load(vec![Ientry::view("main").with_entry(Ientry {
        name: Some("alias".to_string()),
        ref_str: Some("/nowhere/cmd".to_string()),
        ..Ientry::default()
    })])
    .unwrap_err();
    let KlishError::SchemeLoad(diags) = err else {
        panic!("expected load diagnostics");
    };
    assert!(diags.iter().any(|d| d.contains("Dangling")), "{diags:?}");
}

#[test]
fn reference_cycles_are_reported() {
    let err = load(vec![
        Ientry::view("a").with_entry(Ientry {
            name: Some("x".to_string()),
            ref_str: Some("/b/y".to_string()),
            ..Ientry::default()
        }),
        Ientry::view("b").with_entry(Ientry {
            name: Some("y".to_string()),
            ref_str: Some("/a/x".to_string()),
            ..Ientry::default()
        }),
    ])
    .unwrap_err();
    let KlishError::SchemeLoad(diags) = err else {
        panic!("expected load diagnostics");
    };
    assert!(diags.iter().any(|d| d.contains("cycle")), "{diags:?}");
}

#[test]
fn ptype_shorthand_expands_to_a_link() {
    let scheme = load(vec![Ientry::view("main").with_entry(
        Ientry::command("set", "Set something")
            .with_entry(Ientry::param("port", "/UINT 1 65535"))
            .with_action(Iaction::sym("nop")),
    )])
    .unwrap();
    let port = scheme.find_by_path("/main/set/port").unwrap();
    let ptype = scheme.purpose_child(port, EntryPurpose::Ptype).unwrap();
    // The link forwards to /UINT but overrides the range value.
    let uint = scheme.find_root("UINT").unwrap();
    assert_eq!(scheme.resolve(ptype), uint);
    assert_eq!(scheme.value(ptype), Some("1 65535"));
    assert_eq!(scheme.purpose(ptype), EntryPurpose::Ptype);
}

#[test]
fn link_overrides_and_forwarding() {
    let scheme = load(vec![
        Ientry::view("main").with_entry(
            Ientry {
                mode: Some("switch".to_string()),
                ..Ientry::command("original", "Original help")
            }
            .with_action(Iaction::sym("nop")),
        ),
        Ientry::view("other").with_entry(Ientry {
            name: Some("alias".to_string()),
            help: Some("Alias help".to_string()),
            ref_str: Some("/main/original".to_string()),
            ..Ientry::default()
        }),
    ])
    .unwrap();
    let alias = scheme.find_by_path("/other/alias").unwrap();
    let original = scheme.find_by_path("/main/original").unwrap();
    // Own name and overridden help, forwarded mode/actions/children.
    assert_eq!(scheme.name(alias), "alias");
    assert_eq!(scheme.help(alias), Some("Alias help"));
    assert_eq!(scheme.mode(alias), EntryMode::Switch);
    assert_eq!(scheme.actions(alias).len(), 1);
    assert_eq!(scheme.children(alias), scheme.children(original));
    // Without an override the target's value shows through.
    assert_eq!(scheme.min(alias), scheme.min(original));
}

#[test]
fn hotkeys_load_and_rebind() {
    let scheme = load(vec![
        Ientry::view("main")
            .with_hotkey("^Z", "exit")
            .with_hotkey("^Z", "quit"),
    ])
    .unwrap();
    let main = scheme.find_root("main").unwrap();
    let hotkeys = scheme.hotkeys(main);
    assert_eq!(hotkeys.len(), 1);
    assert_eq!(hotkeys[0].cmd, "quit");
}
