//! Core of the modal CLI framework: the scheme model, the parsing and
//! dispatch engine, the action executor and the plugin host.
//!
//! A deserializer produces an [`Ischeme`] DTO; [`Scheme::from_ischeme`]
//! validates and materializes it. A [`Session`] tracks the per-user view
//! path; [`parse_for_exec`] turns an input line into per-stage pargvs and
//! [`Kexec`] runs them.

mod action;
mod argv;
mod builtin;
mod context;
mod entry;
mod env;
mod error;
mod exec;
mod ischeme;
mod load;
mod pargv;
mod parse;
mod plugin;
mod scheme;
mod session;

pub use action::Action;
pub use action::ActionIo;
pub use action::ExecOn;
pub use action::TriFlag;
pub use argv::Args;
pub use argv::split_line;
pub use context::ActionKind;
pub use context::Context;
pub use context::NavOp;
pub use context::StageStdio;
pub use entry::EntryId;
pub use entry::EntryMode;
pub use entry::EntryPurpose;
pub use entry::Filter;
pub use entry::Hotkey;
pub use env::action_env;
pub use error::KlishError;
pub use error::Result;
pub use exec::Kexec;
pub use exec::KexecEvent;
pub use exec::KexecResult;
pub use exec::RunningKexec;
pub use exec::UNRESOLVED_SYM_RETCODE;
pub use ischeme::Iaction;
pub use ischeme::Ientry;
pub use ischeme::Ihotkey;
pub use ischeme::Iplugin;
pub use ischeme::Ischeme;
pub use pargv::Parg;
pub use pargv::ParsePurpose;
pub use pargv::ParseStatus;
pub use pargv::Pargv;
pub use parse::exec_locally;
pub use parse::parse_for_completion;
pub use parse::parse_for_exec;
pub use parse::parse_line;
pub use parse::split_pipes;
pub use plugin::BuiltinSymFn;
pub use plugin::KPLUGIN_MAJOR;
pub use plugin::KPLUGIN_MINOR;
pub use plugin::NativeSymFn;
pub use plugin::Plugin;
pub use plugin::PluginHost;
pub use plugin::Sym;
pub use plugin::SymFn;
pub use scheme::Scheme;
pub use session::Path;
pub use session::Session;
pub use session::SessionInfo;
