use thiserror::Error;

pub type Result<T> = std::result::Result<T, KlishError>;

#[derive(Error, Debug)]
pub enum KlishError {
    /// Accumulated loader diagnostics. Fatal at startup.
    #[error("scheme load failed:\n{}", .0.join("\n"))]
    SchemeLoad(Vec<String>),

    #[error("unknown view \"{0}\"")]
    UnknownView(String),

    #[error("{0}")]
    Parse(String),

    #[error("unresolved symbol \"{0}\"")]
    UnresolvedSym(String),

    #[error("plugin \"{name}\": {reason}")]
    Plugin { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
