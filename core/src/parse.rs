//! Matching engine: argv against the scheme tree of the current path.
//!
//! The walk is recursive over entries. Containers contribute structure
//! without consuming a token; leaves validate the current token through
//! their PTYPE action run locally with captured stdout. SWITCH children are
//! alternatives, SEQUENCE children honor occurrence windows with optional
//! bounce-back, and completion/help purposes collect candidates instead of
//! failing on the final unfinished token.

use crate::argv::Args;
use crate::argv::split_line;
use crate::entry::EntryId;
use crate::entry::EntryMode;
use crate::entry::EntryPurpose;
use crate::entry::Filter;
use crate::exec::run_service;
use crate::pargv::Parg;
use crate::pargv::ParsePurpose;
use crate::pargv::ParseStatus;
use crate::pargv::Pargv;
use crate::plugin::PluginHost;
use crate::scheme::Scheme;
use crate::session::Session;
use crate::session::SessionInfo;

struct ParseCtx<'a> {
    scheme: &'a Scheme,
    plugins: &'a PluginHost,
    info: &'a SessionInfo,
    path_names: &'a [String],
}

/// Split a raw line into pipeline stages. A stage boundary is a
/// whitespace-separated `|` token.
pub fn split_pipes(line: &str) -> Result<Vec<Args>, String> {
    let all = split_line(line);
    let mut list = Vec::new();
    let mut cur = Args::default();
    for arg in &all.args {
        if arg == "|" {
            if cur.args.is_empty() {
                return Err("The pipe '|' can't be at the first position".to_string());
            }
            list.push(std::mem::take(&mut cur));
        } else {
            cur.args.push(arg.clone());
        }
    }
    // The continuable flag matters for the last stage only. An empty last
    // stage is fine for completion, but not a dangling continuable pipe.
    cur.continuable = all.continuable;
    if cur.args.is_empty() && cur.continuable {
        return Err("The pipe '|' can't be the last argument".to_string());
    }
    list.push(cur);
    Ok(list)
}

/// Parse one stage's argv against the session path, deepest view first.
pub fn parse_line(
    scheme: &Scheme,
    plugins: &PluginHost,
    session: &Session,
    args: &Args,
    purpose: ParsePurpose,
    is_filter: bool,
) -> Pargv {
    let path_names: Vec<String> = session
        .path
        .levels()
        .iter()
        .map(|id| scheme.name(*id).to_string())
        .collect();
    let ctx = ParseCtx {
        scheme,
        plugins,
        info: &session.info,
        path_names: &path_names,
    };

    let mut pargv = Pargv::new(purpose, args.continuable);
    let mut cursor = 0usize;
    let mut pstatus = None;
    let mut level_found = 0usize;

    for (index, view) in session.path.iter_deepest_first() {
        // Entries with special purposes never serve as parse roots.
        if scheme.purpose(view) != EntryPurpose::Common {
            continue;
        }
        let status = parse_arg(&ctx, view, &mut cursor, args, &mut pargv, is_filter);
        pstatus = Some(status);
        if status != ParseStatus::NotFound {
            level_found = index;
            break;
        }
        // NOTFOUND with consumed args can't restart on a lower level.
        if !pargv.pargs.is_empty() {
            level_found = index;
            break;
        }
    }

    if cursor < args.len() {
        pargv.last_arg = Some(args.args[cursor].clone());
    }

    // Top-level folding: some nested statuses mean something else here.
    let mut status = match pstatus {
        None => ParseStatus::Error,
        Some(ParseStatus::InProgress) => {
            if cursor >= args.len() {
                ParseStatus::Ok
            } else {
                ParseStatus::Illegal // unparsable trailing arguments
            }
        }
        Some(ParseStatus::NotFound) => ParseStatus::Illegal, // unknown command
        Some(other) => other,
    };
    if status == ParseStatus::Ok && pargv.command.is_none() {
        status = ParseStatus::NoAction;
    }
    // Completion/help never fail on the last unfinished token: collected
    // candidates make the line merely incomplete.
    if purpose != ParsePurpose::Exec && !pargv.completions.is_empty() {
        status = ParseStatus::Incompleted;
    }
    pargv.status = status;
    pargv.level = level_found;
    pargv
}

/// Can this entry be offered as a candidate for the current stage kind?
fn filter_gate(scheme: &Scheme, entry: EntryId, is_filter: bool) -> bool {
    match scheme.filter(entry) {
        Filter::Dual => true,
        Filter::True => is_filter,
        Filter::False => !is_filter,
    }
}

/// Validate the pargv's candidate through its PTYPE action. A non-empty
/// captured stdout replaces the token as the bound value.
fn validate_arg(ctx: &ParseCtx<'_>, pargv: &mut Pargv) -> bool {
    let Some(entry) = pargv.candidate.as_ref().map(|c| c.entry) else {
        return false;
    };
    let Some(ptype) = ctx.scheme.purpose_child(entry, EntryPurpose::Ptype) else {
        return false;
    };
    let Some((retcode, out)) = run_service(
        ctx.scheme,
        ctx.plugins,
        ctx.info,
        ctx.path_names,
        ptype,
        Some(&*pargv),
    ) else {
        return false;
    };
    if retcode != 0 {
        return false;
    }
    if !out.is_empty()
        && let Some(candidate) = pargv.candidate.as_mut()
    {
        candidate.value = Some(out);
    }
    true
}

fn parse_arg(
    ctx: &ParseCtx<'_>,
    entry: EntryId,
    cursor: &mut usize,
    args: &Args,
    pargv: &mut Pargv,
    is_filter: bool,
) -> ParseStatus {
    let scheme = ctx.scheme;
    let purpose = pargv.purpose;
    // Status of the entry itself; nested entries update `rc` below.
    let retcode = ParseStatus::InProgress;

    if !scheme.container(entry) {
        // Candidate leaf. For completion/help the final unfinished token
        // collects candidates instead of failing.
        if (purpose == ParsePurpose::Completion || purpose == ParsePurpose::Help)
            && (filter_gate(scheme, entry, is_filter)
                || (is_filter && !pargv.pargs.is_empty()))
        {
            if *cursor >= args.len() {
                if !pargv.continuable {
                    pargv.add_completion(entry);
                }
                return ParseStatus::Incompleted;
            }
            if *cursor == args.len() - 1 && pargv.continuable {
                pargv.add_completion(entry);
                return ParseStatus::NotFound;
            }
        }

        if *cursor >= args.len() {
            return ParseStatus::Incompleted;
        }

        let current_arg = args.args[*cursor].clone();
        pargv.candidate = Some(Parg {
            entry,
            value: Some(current_arg),
        });
        if validate_arg(ctx, pargv) {
            pargv.accept_candidate();
            // An entry with actions is a command.
            if !scheme.actions(entry).is_empty() {
                pargv.command = Some(entry);
            }
            *cursor += 1;
        } else {
            // Not a container and not validated: nothing to find here.
            pargv.decline_candidate();
            return ParseStatus::NotFound;
        }
    }

    let children = scheme.children(entry);
    if children.is_empty() {
        return retcode;
    }
    let saved_cursor = *cursor;

    let mode = scheme.mode(entry);
    if mode == EntryMode::Empty {
        return retcode;
    }

    // If every nested entry has a special purpose nothing below will touch
    // `rc`, and the entry's own status is the answer.
    let mut rc = retcode;

    match mode {
        EntryMode::Switch => {
            // Alternatives: first success wins. Occurrence windows of
            // SWITCH children are ignored.
            for nested in children.iter().copied() {
                if scheme.purpose(nested) != EntryPurpose::Common {
                    continue;
                }
                rc = parse_arg(ctx, nested, cursor, args, pargv, is_filter);
                // Consumed arguments settle the choice.
                if saved_cursor != *cursor {
                    break;
                }
                // Keep trying alternatives while nothing matched. The
                // INCOMPLETED status rolls on so completion sees every
                // variant.
                if rc != ParseStatus::NotFound && rc != ParseStatus::Incompleted {
                    break;
                }
            }
        }
        EntryMode::Sequence => {
            let kids: Vec<EntryId> = children.to_vec();
            let mut i = 0usize;
            let mut saved_i = 0usize;
            while i < kids.len() {
                let nested = kids[i];
                i += 1;
                if scheme.purpose(nested) != EntryPurpose::Common {
                    continue;
                }
                // An optional entry already bound must not parse twice.
                if pargv.entry_exists(nested) {
                    continue;
                }
                let min = scheme.min(nested);
                let max = scheme.max(nested);
                let mut nrc = ParseStatus::NotFound;
                let mut num = 0usize;
                while num < max {
                    let before = *cursor;
                    nrc = parse_arg(ctx, nested, cursor, args, pargv, is_filter);
                    if nrc != ParseStatus::InProgress {
                        break;
                    }
                    if before == *cursor {
                        break;
                    }
                    num += 1;
                }
                if nrc == ParseStatus::Error || nrc == ParseStatus::Illegal {
                    rc = nrc;
                    break;
                }
                // Not enough instances of a mandatory entry.
                if num < min {
                    rc = if nrc == ParseStatus::InProgress {
                        ParseStatus::NotFound
                    } else {
                        nrc // NOTFOUND or INCOMPLETED
                    };
                    break;
                }
                // A missing optional entry is not an error.
                rc = ParseStatus::InProgress;
                if min > 0 || scheme.order(nested) {
                    saved_i = i;
                }
                // A matched optional bounces back so earlier optional
                // siblings can still match after it.
                if min == 0 && num > 0 {
                    i = saved_i;
                }
            }
        }
        EntryMode::Empty => unreachable!("handled above"),
    }

    // NOTFOUND below a consumed argument makes the whole sequence illegal.
    if rc == ParseStatus::NotFound && (saved_cursor != *cursor || !scheme.container(entry)) {
        rc = ParseStatus::Illegal;
    }

    rc
}

/// Per-stage legality checks once a stage has parsed.
fn check_line(
    scheme: &Scheme,
    pargv: &Pargv,
    is_first: bool,
    is_piped: bool,
) -> Result<(), String> {
    // Execution needs a fully correct pargv; completion doesn't.
    if pargv.purpose == ParsePurpose::Exec && pargv.status != ParseStatus::Ok {
        return Err(pargv.status.as_str().to_string());
    }
    let Some(cmd) = pargv.command else {
        return Ok(());
    };
    let name = scheme.name(cmd);
    if is_first {
        if scheme.filter(cmd) == Filter::True {
            return Err(format!(
                "The filter \"{name}\" can't be used without previous pipeline"
            ));
        }
        if scheme.interactive(cmd) && is_piped {
            return Err(format!(
                "The interactive command \"{name}\" can't have filters"
            ));
        }
    } else {
        if scheme.filter(cmd) == Filter::False {
            return Err(format!(
                "The non-filter command \"{name}\" can't be destination of pipe"
            ));
        }
        if scheme.restore(cmd) {
            return Err(format!("The command \"{name}\" can't be destination of pipe"));
        }
        if scheme.interactive(cmd) {
            return Err(format!("The filter \"{name}\" can't be interactive"));
        }
    }
    Ok(())
}

/// Parse a raw line for completion or help. Every stage but the last must
/// be legal for execution; the last stage collects candidates. Returns
/// `None` when the line can't possibly complete (no detailed reporting:
/// completion is a background operation).
pub fn parse_for_completion(
    scheme: &Scheme,
    plugins: &PluginHost,
    session: &Session,
    line: &str,
) -> Option<Pargv> {
    let split = split_pipes(line).ok()?;
    let is_piped = split.len() > 1;
    let mut result = None;
    for (i, argv) in split.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i == split.len() - 1;
        let purpose = if is_last {
            ParsePurpose::Completion
        } else {
            ParsePurpose::Exec
        };
        let pargv = parse_line(scheme, plugins, session, argv, purpose, !is_first);
        if check_line(scheme, &pargv, is_first, is_piped).is_err() {
            return None;
        }
        if is_last {
            result = Some(pargv);
        }
    }
    result
}

/// Parse a raw line for execution: one pargv per pipeline stage, all of
/// them legal.
pub fn parse_for_exec(
    scheme: &Scheme,
    plugins: &PluginHost,
    session: &Session,
    line: &str,
) -> Result<Vec<Pargv>, String> {
    let split = split_pipes(line)?;
    let is_piped = split.len() > 1;
    let mut pargvs = Vec::new();
    for (i, argv) in split.iter().enumerate() {
        let pargv = parse_line(scheme, plugins, session, argv, ParsePurpose::Exec, i != 0);
        check_line(scheme, &pargv, i == 0, is_piped)?;
        pargvs.push(pargv);
    }
    Ok(pargvs)
}

/// Run a service entry (prompt, completion, help, cond) locally with
/// captured stdout on behalf of a session.
pub fn exec_locally(
    scheme: &Scheme,
    plugins: &PluginHost,
    session: &Session,
    entry: EntryId,
    parent_pargv: Option<&Pargv>,
) -> Option<(i32, String)> {
    let path_names: Vec<String> = session
        .path
        .levels()
        .iter()
        .map(|id| scheme.name(*id).to_string())
        .collect();
    run_service(
        scheme,
        plugins,
        &session.info,
        &path_names,
        entry,
        parent_pargv,
    )
}
