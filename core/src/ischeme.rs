//! Intermediate scheme representation.
//!
//! Any deserializer (the reference one is JSON in `klishd`) produces this
//! tree; the loader in [`crate::load`] materializes it into the live
//! [`crate::Scheme`]. Attribute values stay textual where the original
//! format is textual (`mode`, `purpose`, `filter`, action `in`/`out`) so the
//! loader can report every illegal attribute instead of failing on the
//! first.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ischeme {
    #[serde(default)]
    pub plugins: Vec<Iplugin>,
    #[serde(default)]
    pub entries: Vec<Ientry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ientry {
    /// Mandatory; checked by the loader to keep diagnostics accumulative.
    pub name: Option<String>,
    pub help: Option<String>,
    pub container: Option<bool>,
    pub mode: Option<String>,
    pub purpose: Option<String>,
    pub min: Option<usize>,
    pub max: Option<usize>,
    #[serde(rename = "ref")]
    pub ref_str: Option<String>,
    pub value: Option<String>,
    pub restore: Option<bool>,
    pub order: Option<bool>,
    pub filter: Option<String>,
    pub interactive: Option<bool>,
    /// Shorthand: expands into a nested PTYPE-purpose link entry. The first
    /// whitespace-separated word is the reference path, the remainder (if
    /// any) becomes the link's `value` (e.g. a numeric range).
    pub ptype: Option<String>,
    #[serde(default)]
    pub entries: Vec<Ientry>,
    #[serde(default)]
    pub actions: Vec<Iaction>,
    #[serde(default)]
    pub hotkeys: Vec<Ihotkey>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Iaction {
    /// Mandatory.
    pub sym: Option<String>,
    pub lock: Option<String>,
    pub interrupt: Option<bool>,
    #[serde(rename = "in")]
    pub input: Option<String>,
    pub out: Option<String>,
    pub exec_on: Option<String>,
    pub update_retcode: Option<bool>,
    pub permanent: Option<bool>,
    pub sync: Option<bool>,
    pub script: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ihotkey {
    pub key: Option<String>,
    pub cmd: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Iplugin {
    /// Mandatory; also the default symbol-table id.
    pub name: Option<String>,
    /// Overrides the `kplugin_<id>_*` export prefix.
    pub id: Option<String>,
    /// Mandatory for loadable plugins.
    pub file: Option<String>,
    pub conf: Option<String>,
}

impl Ientry {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// A view: container entry whose children are alternative commands.
    pub fn view(name: &str) -> Self {
        Self {
            container: Some(true),
            mode: Some("switch".to_string()),
            ..Self::named(name)
        }
    }

    /// A command: matches its own name through the COMMAND ptype, nested
    /// params follow in sequence.
    pub fn command(name: &str, help: &str) -> Self {
        Self {
            help: Some(help.to_string()),
            ptype: Some("/COMMAND".to_string()),
            ..Self::named(name)
        }
    }

    /// A parameter with the given ptype reference (optionally followed by a
    /// range payload, e.g. `"/UINT 1 65535"`).
    pub fn param(name: &str, ptype: &str) -> Self {
        Self {
            ptype: Some(ptype.to_string()),
            ..Self::named(name)
        }
    }

    pub fn with_entry(mut self, child: Ientry) -> Self {
        self.entries.push(child);
        self
    }

    pub fn with_action(mut self, action: Iaction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_hotkey(mut self, key: &str, cmd: &str) -> Self {
        self.hotkeys.push(Ihotkey {
            key: Some(key.to_string()),
            cmd: Some(cmd.to_string()),
        });
        self
    }
}

impl Iaction {
    pub fn sym(sym: &str) -> Self {
        Self {
            sym: Some(sym.to_string()),
            ..Self::default()
        }
    }

    pub fn with_script(mut self, script: &str) -> Self {
        self.script = Some(script.to_string());
        self
    }
}
