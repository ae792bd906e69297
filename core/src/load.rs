//! Materializes the intermediate scheme into the live one.
//!
//! Diagnostics are accumulated so a single load surfaces every problem:
//! missing mandatory fields, illegal attribute values, duplicate siblings,
//! dangling or cyclic references.

use crate::action::Action;
use crate::action::ActionIo;
use crate::action::ExecOn;
use crate::action::TriFlag;
use crate::entry::Entry;
use crate::entry::EntryId;
use crate::entry::EntryMode;
use crate::entry::EntryPurpose;
use crate::entry::Filter;
use crate::entry::Hotkey;
use crate::entry::LinkShell;
use crate::error::KlishError;
use crate::ischeme::Iaction;
use crate::ischeme::Ientry;
use crate::ischeme::Ischeme;
use crate::scheme::Scheme;

impl Scheme {
    /// Build a live scheme from the DTO. Default PTYPEs are registered
    /// before user entries so references like `/COMMAND` always resolve.
    pub fn from_ischeme(ischeme: &Ischeme) -> Result<Self, KlishError> {
        let mut scheme = Scheme::default();
        let mut diags = Vec::new();

        for ptype in crate::builtin::default_ptypes() {
            scheme.load_root(&ptype, &mut diags);
        }
        for ientry in &ischeme.entries {
            scheme.load_root(ientry, &mut diags);
        }

        scheme.resolve_refs(&mut diags);
        scheme.index_purposes();

        if diags.is_empty() {
            Ok(scheme)
        } else {
            Err(KlishError::SchemeLoad(diags))
        }
    }

    /// Top-level views merge on name collision: later attributes
    /// overwrite, nested elements append. A collision at any other entry
    /// kind is an error, so a user entry can't silently melt into a
    /// builtin PTYPE.
    fn load_root(&mut self, ientry: &Ientry, diags: &mut Vec<String>) {
        let Some(name) = ientry.name.as_deref() else {
            diags.push("ENTRY: Empty 'name' attribute".to_string());
            return;
        };
        match self.find_root(name) {
            Some(existing) => {
                let existing_is_view = self.purpose(existing) == EntryPurpose::Common
                    && self.container(existing);
                let incoming_is_view = ientry
                    .purpose
                    .as_deref()
                    .is_none_or(|p| p.eq_ignore_ascii_case("common"))
                    && ientry.container.unwrap_or(true)
                    && ientry.ref_str.is_none()
                    && ientry.ptype.is_none();
                if !existing_is_view || !incoming_is_view {
                    diags.push(format!(
                        "ENTRY \"{name}\": collides with an existing entry of a different kind"
                    ));
                    return;
                }
                self.apply_attrs(existing, ientry, diags);
                self.load_nested(existing, ientry, diags);
            }
            None => {
                if let Some(id) = self.materialize(ientry, None, diags) {
                    self.roots.push(id);
                }
            }
        }
    }

    fn materialize(
        &mut self,
        ientry: &Ientry,
        parent: Option<EntryId>,
        diags: &mut Vec<String>,
    ) -> Option<EntryId> {
        let Some(name) = ientry.name.as_deref() else {
            diags.push("ENTRY: Empty 'name' attribute".to_string());
            return None;
        };
        let id = EntryId(self.arena.len());
        self.arena.push(Entry::new(name));
        self.node_mut(id).parent = parent;
        self.apply_attrs(id, ientry, diags);
        self.load_nested(id, ientry, diags);
        Some(id)
    }

    fn apply_attrs(&mut self, id: EntryId, ientry: &Ientry, diags: &mut Vec<String>) {
        let name = self.node(id).name.clone();

        if let Some(ref_str) = &ientry.ref_str {
            // A link carries only its own name plus the overridable
            // attributes; everything else forwards to the target.
            self.node_mut(id).link = Some(LinkShell {
                ref_str: ref_str.clone(),
                target: None,
                help: ientry.help.clone(),
                min: ientry.min,
                max: ientry.max,
                value: ientry.value.clone(),
                restore: ientry.restore,
                order: ientry.order,
            });
            return;
        }

        let node = self.node_mut(id);
        if let Some(help) = &ientry.help {
            node.help = Some(help.clone());
        }
        if let Some(container) = ientry.container {
            node.container = container;
        }
        if let Some(min) = ientry.min {
            node.min = min;
        }
        if let Some(max) = ientry.max {
            node.max = max;
        }
        if let Some(value) = &ientry.value {
            node.value = Some(value.clone());
        }
        if let Some(restore) = ientry.restore {
            node.restore = restore;
        }
        if let Some(order) = ientry.order {
            node.order = order;
        }
        if let Some(interactive) = ientry.interactive {
            node.interactive = interactive;
        }
        if let Some(mode) = &ientry.mode {
            match parse_mode(mode) {
                Some(m) => self.node_mut(id).mode = m,
                None => diags.push(format!("ENTRY \"{name}\": Illegal 'mode' attribute")),
            }
        }
        if let Some(purpose) = &ientry.purpose {
            match parse_purpose(purpose) {
                Some(p) => self.node_mut(id).purpose = p,
                None => diags.push(format!("ENTRY \"{name}\": Illegal 'purpose' attribute")),
            }
        }
        if let Some(filter) = &ientry.filter {
            match parse_filter(filter) {
                Some(f) => self.node_mut(id).filter = f,
                None => diags.push(format!("ENTRY \"{name}\": Illegal 'filter' attribute")),
            }
        }
    }

    fn load_nested(&mut self, id: EntryId, ientry: &Ientry, diags: &mut Vec<String>) {
        // The ptype shorthand becomes a leading nested link entry.
        if let Some(ptype) = &ientry.ptype {
            let (path, range) = match ptype.split_once(char::is_whitespace) {
                Some((p, r)) => (p.to_string(), Some(r.trim().to_string())),
                None => (ptype.clone(), None),
            };
            let shorthand = Ientry {
                name: Some("__ptype".to_string()),
                purpose: Some("ptype".to_string()),
                ref_str: Some(path),
                value: range,
                ..Ientry::default()
            };
            self.add_child(id, &shorthand, diags);
        }

        for nested in &ientry.entries {
            self.add_child(id, nested, diags);
        }

        for iaction in &ientry.actions {
            let name = self.node(id).name.clone();
            if let Some(action) = load_action(iaction, &name, diags) {
                self.node_mut(id).actions.push(action);
            }
        }

        for ihotkey in &ientry.hotkeys {
            let name = self.node(id).name.clone();
            let (Some(key), Some(cmd)) = (&ihotkey.key, &ihotkey.cmd) else {
                diags.push(format!("ENTRY \"{name}\": Incomplete HOTKEY"));
                continue;
            };
            let hotkeys = &mut self.node_mut(id).hotkeys;
            // Rebinding a key within one entry overwrites.
            hotkeys.retain(|h| h.key != *key);
            hotkeys.push(Hotkey {
                key: key.clone(),
                cmd: cmd.clone(),
            });
        }
    }

    fn add_child(&mut self, parent: EntryId, nested: &Ientry, diags: &mut Vec<String>) {
        if let Some(name) = nested.name.as_deref() {
            if self.find_child_own(parent, name).is_some() {
                let pname = self.node(parent).name.clone();
                diags.push(format!(
                    "ENTRY \"{pname}\": Can't add duplicate ENTRY \"{name}\""
                ));
                return;
            }
        }
        if let Some(child) = self.materialize(nested, Some(parent), diags) {
            self.node_mut(parent).children.push(child);
        }
    }

    /// Sibling lookup against own (shell) names, valid before resolution.
    fn find_child_own(&self, parent: EntryId, name: &str) -> Option<EntryId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|id| self.node(*id).name == name)
    }

    fn resolve_refs(&mut self, diags: &mut Vec<String>) {
        // Pass 1: point every link at its target by path walk.
        for index in 0..self.arena.len() {
            let id = EntryId(index);
            let Some(ref_str) = self.node(id).link.as_ref().map(|l| l.ref_str.clone()) else {
                continue;
            };
            match self.find_by_path(&ref_str) {
                Some(target) if target != id => {
                    if let Some(shell) = &mut self.node_mut(id).link {
                        shell.target = Some(target);
                    }
                }
                _ => {
                    let name = self.node(id).name.clone();
                    diags.push(format!(
                        "ENTRY \"{name}\": Dangling reference \"{ref_str}\""
                    ));
                }
            }
        }

        // Pass 2: a colored walk over link chains to reject cycles.
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;
        let mut color = vec![WHITE; self.arena.len()];
        for index in 0..self.arena.len() {
            if color[index] != WHITE {
                continue;
            }
            let mut chain = Vec::new();
            let mut cur = EntryId(index);
            loop {
                if color[cur.0] == GRAY {
                    let name = self.node(cur).name.clone();
                    diags.push(format!("ENTRY \"{name}\": Reference cycle"));
                    // Break the cycle so later passes terminate.
                    if let Some(shell) = &mut self.node_mut(cur).link {
                        shell.target = None;
                    }
                    break;
                }
                if color[cur.0] == BLACK {
                    break;
                }
                color[cur.0] = GRAY;
                chain.push(cur);
                match self.node(cur).link.as_ref().and_then(|l| l.target) {
                    Some(next) => cur = next,
                    None => break,
                }
            }
            for id in chain {
                color[id.0] = BLACK;
            }
        }
    }

    fn index_purposes(&mut self) {
        for index in 0..self.arena.len() {
            let id = EntryId(index);
            if self.node(id).is_link() {
                continue;
            }
            let children = self.node(id).children.clone();
            for child in children {
                let purpose = self.purpose(child);
                if purpose != EntryPurpose::Common {
                    self.node_mut(id).nested_by_purpose[purpose.slot()] = Some(child);
                }
            }
        }
    }
}

fn parse_mode(text: &str) -> Option<EntryMode> {
    match text.to_ascii_lowercase().as_str() {
        "sequence" => Some(EntryMode::Sequence),
        "switch" => Some(EntryMode::Switch),
        "empty" => Some(EntryMode::Empty),
        _ => None,
    }
}

fn parse_purpose(text: &str) -> Option<EntryPurpose> {
    match text.to_ascii_lowercase().as_str() {
        "common" => Some(EntryPurpose::Common),
        "ptype" => Some(EntryPurpose::Ptype),
        "prompt" => Some(EntryPurpose::Prompt),
        "cond" => Some(EntryPurpose::Cond),
        "completion" => Some(EntryPurpose::Completion),
        "help" => Some(EntryPurpose::Help),
        "log" => Some(EntryPurpose::Log),
        _ => None,
    }
}

fn parse_filter(text: &str) -> Option<Filter> {
    match text.to_ascii_lowercase().as_str() {
        "false" => Some(Filter::False),
        "true" => Some(Filter::True),
        "dual" => Some(Filter::Dual),
        _ => None,
    }
}

fn parse_io(text: &str) -> Option<ActionIo> {
    match text.to_ascii_lowercase().as_str() {
        "false" => Some(ActionIo::False),
        "true" => Some(ActionIo::True),
        "tty" => Some(ActionIo::Tty),
        _ => None,
    }
}

fn parse_exec_on(text: &str) -> Option<ExecOn> {
    match text.to_ascii_lowercase().as_str() {
        "fail" => Some(ExecOn::Fail),
        "success" => Some(ExecOn::Success),
        "always" => Some(ExecOn::Always),
        "never" => Some(ExecOn::Never),
        _ => None,
    }
}

fn load_action(iaction: &Iaction, owner: &str, diags: &mut Vec<String>) -> Option<Action> {
    let Some(sym) = iaction.sym.as_deref() else {
        diags.push(format!("ENTRY \"{owner}\": ACTION without 'sym' attribute"));
        return None;
    };
    let mut action = Action::new(sym);
    action.script = iaction.script.clone();
    action.lock = iaction.lock.clone();
    if let Some(interrupt) = iaction.interrupt {
        action.interrupt = interrupt;
    }
    if let Some(input) = &iaction.input {
        match parse_io(input) {
            Some(io) => action.input = io,
            None => diags.push(format!("ENTRY \"{owner}\": Illegal ACTION 'in' attribute")),
        }
    }
    if let Some(out) = &iaction.out {
        match parse_io(out) {
            Some(io) => action.output = io,
            None => diags.push(format!("ENTRY \"{owner}\": Illegal ACTION 'out' attribute")),
        }
    }
    if let Some(exec_on) = &iaction.exec_on {
        match parse_exec_on(exec_on) {
            Some(on) => action.exec_on = on,
            None => diags.push(format!(
                "ENTRY \"{owner}\": Illegal ACTION 'exec_on' attribute"
            )),
        }
    }
    if let Some(update) = iaction.update_retcode {
        action.update_retcode = update;
    }
    if let Some(permanent) = iaction.permanent {
        action.permanent = if permanent { TriFlag::True } else { TriFlag::False };
    }
    if let Some(sync) = iaction.sync {
        action.sync = if sync { TriFlag::True } else { TriFlag::False };
    }
    Some(action)
}
