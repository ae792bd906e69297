//! Parsed-argument vector: the parser's output.

use crate::entry::EntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePurpose {
    Exec,
    Completion,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    InProgress,
    NotFound,
    Incompleted,
    Illegal,
    NoAction,
    Error,
}

impl ParseStatus {
    /// User-facing description used in error replies.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::InProgress => "In progress",
            Self::NotFound => "Unknown command",
            Self::Incompleted => "Incompleted command",
            Self::Illegal => "Illegal command",
            Self::NoAction => "Command has no action",
            Self::Error => "Parsing error",
        }
    }
}

/// One (entry, value) binding. Commands bind with no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parg {
    pub entry: EntryId,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pargv {
    pub purpose: ParsePurpose,
    pub status: ParseStatus,
    pub continuable: bool,
    /// The matched command entry (an entry with actions).
    pub command: Option<EntryId>,
    pub pargs: Vec<Parg>,
    /// Candidate entries collected for completion/help purposes.
    pub completions: Vec<EntryId>,
    /// The last, possibly incomplete, token of the line.
    pub last_arg: Option<String>,
    /// View-stack level the command was found at (0 = bottom).
    pub level: usize,
    /// Candidate parg under validation; service actions read it through
    /// their parent pargv.
    pub candidate: Option<Parg>,
}

impl Pargv {
    pub fn new(purpose: ParsePurpose, continuable: bool) -> Self {
        Self {
            purpose,
            status: ParseStatus::Error,
            continuable,
            command: None,
            pargs: Vec::new(),
            completions: Vec::new(),
            last_arg: None,
            level: 0,
            candidate: None,
        }
    }

    /// Is this entry already bound? Keeps optional siblings from being
    /// parsed twice on bounce-back.
    pub fn entry_exists(&self, entry: EntryId) -> bool {
        self.pargs.iter().any(|p| p.entry == entry)
    }

    pub fn add_completion(&mut self, entry: EntryId) {
        if !self.completions.contains(&entry) {
            self.completions.push(entry);
        }
    }

    /// Accept the candidate into the binding list.
    pub fn accept_candidate(&mut self) {
        if let Some(parg) = self.candidate.take() {
            self.pargs.push(parg);
        }
    }

    pub fn decline_candidate(&mut self) {
        self.candidate = None;
    }

    /// All bound values of parameters with the given entry name, in
    /// binding order.
    pub fn values_of<'a>(&'a self, scheme: &'a crate::Scheme, name: &str) -> Vec<&'a str> {
        self.pargs
            .iter()
            .filter(|p| scheme.name(p.entry) == name)
            .filter_map(|p| p.value.as_deref())
            .collect()
    }
}
