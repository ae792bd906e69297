//! The builtin `klish` plugin: default PTYPE validators, their
//! completion/help generators, and the navigation/prompt service syms.

use crate::context::Context;
use crate::context::NavOp;
use crate::ischeme::Iaction;
use crate::ischeme::Ientry;
use crate::plugin::Plugin;
use crate::plugin::SymFn;

pub(crate) fn builtin_plugin() -> Plugin {
    let mut plugin = Plugin::builtin("klish");
    let syms: &[(&str, crate::plugin::BuiltinSymFn)] = &[
        ("COMMAND", sym_command),
        ("COMMAND_CASE", sym_command_case),
        ("INT", sym_int),
        ("UINT", sym_uint),
        ("STRING", sym_string),
        ("completion_COMMAND", sym_completion_command),
        ("help_COMMAND", sym_help_command),
        ("nav", sym_nav),
        ("prompt", sym_prompt),
        ("nop", sym_nop),
        ("printl", sym_printl),
    ];
    for (name, func) in syms {
        plugin.add_sym(name, SymFn::Builtin(*func));
    }
    plugin
}

/// DTO for the always-registered default PTYPEs.
pub(crate) fn default_ptypes() -> Vec<Ientry> {
    let command_subs = |ientry: Ientry| {
        ientry
            .with_entry(Ientry {
                name: Some("__completion".to_string()),
                purpose: Some("completion".to_string()),
                actions: vec![Iaction::sym("completion_COMMAND")],
                ..Ientry::default()
            })
            .with_entry(Ientry {
                name: Some("__help".to_string()),
                purpose: Some("help".to_string()),
                actions: vec![Iaction::sym("help_COMMAND")],
                ..Ientry::default()
            })
    };

    let ptype = |name: &str, help: &str, sym: &str| Ientry {
        purpose: Some("ptype".to_string()),
        help: Some(help.to_string()),
        actions: vec![Iaction::sym(sym)],
        ..Ientry::named(name)
    };

    vec![
        command_subs(ptype("COMMAND", "Command name", "COMMAND")),
        command_subs(ptype("COMMAND_CASE", "Case sensitive command name", "COMMAND_CASE")),
        ptype("INT", "Integer", "INT"),
        ptype("UINT", "Unsigned integer", "UINT"),
        ptype("STRING", "String", "STRING"),
    ]
}

/// PTYPE: the candidate token must equal the entry's value-or-name,
/// case-insensitively.
fn sym_command(ctx: &mut Context<'_>) -> i32 {
    let Some(entry) = ctx.candidate_entry() else {
        return -1;
    };
    let Some(value) = ctx.candidate_value() else {
        return -1;
    };
    let expected = ctx.scheme.token_text(entry);
    if value.eq_ignore_ascii_case(expected) { 0 } else { -1 }
}

/// PTYPE: case sensitive variant of COMMAND.
fn sym_command_case(ctx: &mut Context<'_>) -> i32 {
    let Some(entry) = ctx.candidate_entry() else {
        return -1;
    };
    let Some(value) = ctx.candidate_value() else {
        return -1;
    };
    if value == ctx.scheme.token_text(entry) { 0 } else { -1 }
}

/// The range for INT/UINT comes from the action script, falling back to
/// the `value` of the ptype entry being executed (so a link can override
/// the range per parameter).
fn range_source(ctx: &Context<'_>) -> String {
    let script = ctx.script();
    if !script.trim().is_empty() {
        return script.to_string();
    }
    ctx.entry
        .and_then(|id| ctx.scheme.value(id))
        .unwrap_or("")
        .to_string()
}

/// PTYPE: signed integer with an optional `min max` range.
fn sym_int(ctx: &mut Context<'_>) -> i32 {
    let Some(value_str) = ctx.candidate_value() else {
        return -1;
    };
    let Ok(value) = value_str.parse::<i64>() else {
        return -1;
    };
    let range = range_source(ctx);
    let mut bounds = range.split_whitespace();
    if let Some(min) = bounds.next() {
        match min.parse::<i64>() {
            Ok(min) if value >= min => {}
            _ => return -1,
        }
    }
    if let Some(max) = bounds.next() {
        match max.parse::<i64>() {
            Ok(max) if value <= max => {}
            _ => return -1,
        }
    }
    0
}

/// PTYPE: unsigned integer with an optional `min max` range.
fn sym_uint(ctx: &mut Context<'_>) -> i32 {
    let Some(value_str) = ctx.candidate_value() else {
        return -1;
    };
    let Ok(value) = value_str.parse::<u64>() else {
        return -1;
    };
    let range = range_source(ctx);
    let mut bounds = range.split_whitespace();
    if let Some(min) = bounds.next() {
        match min.parse::<u64>() {
            Ok(min) if value >= min => {}
            _ => return -1,
        }
    }
    if let Some(max) = bounds.next() {
        match max.parse::<u64>() {
            Ok(max) if value <= max => {}
            _ => return -1,
        }
    }
    0
}

/// PTYPE: any string.
fn sym_string(_ctx: &mut Context<'_>) -> i32 {
    0
}

/// COMPLETION: a COMMAND-typed candidate completes to its value-or-name.
fn sym_completion_command(ctx: &mut Context<'_>) -> i32 {
    let Some(entry) = ctx.candidate_entry() else {
        return 0;
    };
    let text = ctx.scheme.token_text(entry).to_string();
    ctx.println(&text);
    0
}

/// HELP: `prefix` line then `text` line for a COMMAND-typed candidate.
fn sym_help_command(ctx: &mut Context<'_>) -> i32 {
    let Some(entry) = ctx.candidate_entry() else {
        return -1;
    };
    let prefix = ctx.scheme.token_text(entry).to_string();
    let text = ctx
        .scheme
        .help(entry)
        .unwrap_or_else(|| ctx.scheme.token_text(entry))
        .to_string();
    ctx.println(&prefix);
    ctx.println(&text);
    0
}

/// Navigation. Script grammar, one directive per line:
/// `push <view>`, `pop [n]`, `top`, `exit`.
fn sym_nav(ctx: &mut Context<'_>) -> i32 {
    let script = ctx.script().to_string();
    for line in script.lines() {
        let mut words = line.split_whitespace();
        let Some(op) = words.next() else {
            continue;
        };
        match op {
            "push" => {
                let Some(view) = words.next() else {
                    ctx.eprintln("nav: push needs a view name");
                    return -1;
                };
                if ctx.scheme.find_root(view).is_none() {
                    ctx.eprintln(&format!("nav: unknown view \"{view}\""));
                    return -1;
                }
                ctx.nav.push(NavOp::Push(view.to_string()));
            }
            "pop" => {
                let n = match words.next() {
                    Some(n) => match n.parse::<usize>() {
                        Ok(n) => n,
                        Err(_) => {
                            ctx.eprintln("nav: illegal pop count");
                            return -1;
                        }
                    },
                    None => 1,
                };
                ctx.nav.push(NavOp::Pop(n));
            }
            "top" => ctx.nav.push(NavOp::Top),
            "exit" => ctx.nav.push(NavOp::Exit),
            other => {
                ctx.eprintln(&format!("nav: unknown directive \"{other}\""));
                return -1;
            }
        }
    }
    0
}

/// Prompt generator. Expands `%u` (user), `%h` (hostname), `%w` (view
/// path) and `%%` in the action script.
fn sym_prompt(ctx: &mut Context<'_>) -> i32 {
    let script = ctx.script().to_string();
    let mut out = String::with_capacity(script.len());
    let mut chars = script.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('u') => out.push_str(&ctx.session.user),
            Some('h') => out.push_str(&hostname()),
            Some('w') => out.push_str(&ctx.path_names.join("/")),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    ctx.print(&out);
    0
}

fn sym_nop(_ctx: &mut Context<'_>) -> i32 {
    0
}

/// Emits the action script followed by a newline.
fn sym_printl(ctx: &mut Context<'_>) -> i32 {
    let script = ctx.script().to_string();
    ctx.println(&script);
    0
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
