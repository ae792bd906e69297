//! Plugin host: ordered symbol tables, optionally backed by dynamic
//! libraries.
//!
//! A loadable plugin is a `cdylib` built against this crate. It exports
//! `kplugin_<id>_major` / `kplugin_<id>_minor` version bytes plus
//! `kplugin_<id>_init` / `kplugin_<id>_fini`; init registers symbols into
//! the [`Plugin`] it receives. The always-present builtin plugin `klish`
//! registers the default PTYPE validators and service syms in-process.

use std::path::PathBuf;

use libloading::Library;
use libloading::Symbol;

use crate::context::Context;
use crate::error::KlishError;
use crate::error::Result;
use crate::ischeme::Ischeme;

pub const KPLUGIN_MAJOR: u8 = 1;
pub const KPLUGIN_MINOR: u8 = 0;

/// In-process symbol implementation.
pub type BuiltinSymFn = fn(&mut Context<'_>) -> i32;

/// Symbol implementation exported by a dynamic library.
pub type NativeSymFn = unsafe extern "C" fn(*mut Context<'static>) -> libc::c_int;

/// `kplugin_<id>_init` / `kplugin_<id>_fini` signature.
pub type PluginLifecycleFn = unsafe extern "C" fn(*mut Plugin) -> libc::c_int;

pub enum SymFn {
    Builtin(BuiltinSymFn),
    Native(NativeSymFn),
}

impl std::fmt::Debug for SymFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin(_) => f.write_str("SymFn::Builtin"),
            Self::Native(_) => f.write_str("SymFn::Native"),
        }
    }
}

impl SymFn {
    pub fn call(&self, ctx: &mut Context<'_>) -> i32 {
        match self {
            Self::Builtin(func) => func(ctx),
            Self::Native(func) => {
                let ptr = (ctx as *mut Context<'_>).cast::<Context<'static>>();
                unsafe { func(ptr) }
            }
        }
    }
}

#[derive(Debug)]
pub struct Sym {
    pub name: String,
    pub func: SymFn,
}

#[derive(Debug)]
pub struct Plugin {
    pub name: String,
    /// Export prefix; defaults to the plugin name.
    pub id: String,
    pub file: Option<PathBuf>,
    pub conf: Option<String>,
    syms: Vec<Sym>,
    /// Keeps the library mapped for as long as its syms are reachable.
    lib: Option<Library>,
}

impl Plugin {
    pub fn builtin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: name.to_string(),
            file: None,
            conf: None,
            syms: Vec::new(),
            lib: None,
        }
    }

    pub fn add_sym(&mut self, name: &str, func: SymFn) {
        self.syms.push(Sym {
            name: name.to_string(),
            func,
        });
    }

    pub fn find_sym(&self, name: &str) -> Option<&Sym> {
        self.syms.iter().find(|s| s.name == name)
    }

    fn load(&mut self) -> Result<()> {
        let Some(file) = self.file.clone() else {
            return Ok(()); // builtin
        };
        let name = self.name.clone();
        let err = move |reason: String| KlishError::Plugin {
            name: name.clone(),
            reason,
        };
        let lib = unsafe { Library::new(&file) }
            .map_err(|e| err(format!("can't load library {}: {e}", file.display())))?;

        let major_name = format!("kplugin_{}_major\0", self.id);
        let minor_name = format!("kplugin_{}_minor\0", self.id);
        let (major, minor) = unsafe {
            let major: Symbol<*mut u8> = lib
                .get(major_name.as_bytes())
                .map_err(|_| err(format!("missing symbol kplugin_{}_major", self.id)))?;
            let minor: Symbol<*mut u8> = lib
                .get(minor_name.as_bytes())
                .map_err(|_| err(format!("missing symbol kplugin_{}_minor", self.id)))?;
            (**major, **minor)
        };
        if major != KPLUGIN_MAJOR || minor != KPLUGIN_MINOR {
            return Err(err(format!(
                "ABI version {major}.{minor} doesn't match host {KPLUGIN_MAJOR}.{KPLUGIN_MINOR}"
            )));
        }

        let init_name = format!("kplugin_{}_init\0", self.id);
        let init: PluginLifecycleFn = unsafe {
            *lib.get::<PluginLifecycleFn>(init_name.as_bytes())
                .map_err(|_| err(format!("missing symbol kplugin_{}_init", self.id)))?
        };
        let this: *mut Plugin = self;
        let rc = unsafe { init(this) };
        if rc != 0 {
            return Err(err(format!("init failed with code {rc}")));
        }

        self.lib = Some(lib);
        Ok(())
    }

    fn fini(&mut self) {
        // Copy the raw fn pointer out so the symbol's borrow of the
        // library ends before the call; the library itself stays mapped.
        let func: Option<PluginLifecycleFn> = {
            let Some(lib) = &self.lib else {
                return;
            };
            let fini_name = format!("kplugin_{}_fini\0", self.id);
            unsafe { lib.get::<PluginLifecycleFn>(fini_name.as_bytes()) }
                .ok()
                .map(|symbol| *symbol)
        };
        if let Some(func) = func {
            let this: *mut Plugin = self;
            let rc = unsafe { func(this) };
            if rc != 0 {
                tracing::warn!(plugin = %self.name, "plugin fini returned {rc}");
            }
        }
    }
}

#[derive(Debug)]
pub struct PluginHost {
    plugins: Vec<Plugin>,
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginHost {
    /// The builtin `klish` plugin is registered first: unpinned lookups
    /// see its syms before any user plugin's.
    pub fn new() -> Self {
        Self {
            plugins: vec![crate::builtin::builtin_plugin()],
        }
    }

    /// Build the host from the DTO plugin list and load every library.
    /// Any failure is fatal for startup.
    pub fn from_ischeme(ischeme: &Ischeme) -> Result<Self> {
        let mut host = Self::new();
        for iplugin in &ischeme.plugins {
            let Some(name) = iplugin.name.clone() else {
                return Err(KlishError::Plugin {
                    name: "?".to_string(),
                    reason: "empty 'name' attribute".to_string(),
                });
            };
            if name == "klish" {
                continue; // builtin, always present
            }
            let Some(file) = iplugin.file.clone() else {
                return Err(KlishError::Plugin {
                    name,
                    reason: "empty 'file' attribute".to_string(),
                });
            };
            let mut plugin = Plugin::builtin(&name);
            plugin.id = iplugin.id.clone().unwrap_or_else(|| name.clone());
            plugin.file = Some(PathBuf::from(file));
            plugin.conf = iplugin.conf.clone();
            host.add(plugin)?;
        }
        Ok(host)
    }

    pub fn add(&mut self, mut plugin: Plugin) -> Result<()> {
        plugin.load()?;
        self.plugins.push(plugin);
        Ok(())
    }

    /// Resolve `sym` or `sym@plugin`: a pinned reference searches only the
    /// named plugin, otherwise plugins are searched in registration order.
    pub fn find_sym(&self, sym_ref: &str) -> Result<&Sym> {
        let unresolved = || KlishError::UnresolvedSym(sym_ref.to_string());
        match sym_ref.split_once('@') {
            Some((name, plugin_name)) => {
                let plugin = self
                    .plugins
                    .iter()
                    .find(|p| p.name == plugin_name)
                    .ok_or_else(unresolved)?;
                plugin.find_sym(name).ok_or_else(unresolved)
            }
            None => self
                .plugins
                .iter()
                .find_map(|p| p.find_sym(sym_ref))
                .ok_or_else(unresolved),
        }
    }

    /// Unload in reverse registration order.
    pub fn fini_all(&mut self) {
        while let Some(mut plugin) = self.plugins.pop() {
            plugin.fini();
        }
    }
}
