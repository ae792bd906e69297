//! Entry node types for the live scheme tree.
//!
//! Entries live in an arena owned by [`crate::Scheme`] and refer to each
//! other by [`EntryId`]. An entry with a `ref_str` is a *link*: it carries
//! its own `name` and may override `help`, `min`, `max`, `value`, `restore`
//! and `order`; every other field read forwards to the referenced target.

use crate::action::Action;

/// Arena index of an entry. Stable for the lifetime of one scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryMode {
    #[default]
    Sequence,
    Switch,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryPurpose {
    #[default]
    Common,
    Ptype,
    Prompt,
    Cond,
    Completion,
    Help,
    Log,
}

impl EntryPurpose {
    pub(crate) const COUNT: usize = 7;

    pub(crate) fn slot(self) -> usize {
        match self {
            Self::Common => 0,
            Self::Ptype => 1,
            Self::Prompt => 2,
            Self::Cond => 3,
            Self::Completion => 4,
            Self::Help => 5,
            Self::Log => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    False,
    True,
    Dual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotkey {
    pub key: String,
    pub cmd: String,
}

/// One arena node. For links only the fields listed in [`LinkShell`] are
/// meaningful besides `name`; accessors on `Scheme` do the forwarding.
#[derive(Debug)]
pub struct Entry {
    pub(crate) name: String,
    pub(crate) parent: Option<EntryId>,
    pub(crate) help: Option<String>,
    pub(crate) container: bool,
    pub(crate) mode: EntryMode,
    pub(crate) purpose: EntryPurpose,
    pub(crate) min: usize,
    /// 0 means unbounded.
    pub(crate) max: usize,
    pub(crate) value: Option<String>,
    pub(crate) restore: bool,
    pub(crate) order: bool,
    pub(crate) filter: Filter,
    pub(crate) interactive: bool,
    pub(crate) actions: Vec<Action>,
    pub(crate) hotkeys: Vec<Hotkey>,
    pub(crate) children: Vec<EntryId>,
    pub(crate) nested_by_purpose: [Option<EntryId>; EntryPurpose::COUNT],
    pub(crate) link: Option<LinkShell>,
}

/// Link payload: the textual reference plus the attributes a link is
/// allowed to override (set only when the deserializer set them).
#[derive(Debug)]
pub struct LinkShell {
    pub(crate) ref_str: String,
    pub(crate) target: Option<EntryId>,
    pub(crate) help: Option<String>,
    pub(crate) min: Option<usize>,
    pub(crate) max: Option<usize>,
    pub(crate) value: Option<String>,
    pub(crate) restore: Option<bool>,
    pub(crate) order: Option<bool>,
}

impl Entry {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            help: None,
            container: false,
            mode: EntryMode::Sequence,
            purpose: EntryPurpose::Common,
            min: 1,
            max: 1,
            value: None,
            restore: false,
            order: false,
            filter: Filter::False,
            interactive: false,
            actions: Vec::new(),
            hotkeys: Vec::new(),
            children: Vec::new(),
            nested_by_purpose: [None; EntryPurpose::COUNT],
            link: None,
        }
    }

    pub(crate) fn is_link(&self) -> bool {
        self.link.is_some()
    }
}
