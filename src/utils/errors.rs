use std::path::PathBuf;
use thiserror::Error;

/// Where in a source file an error occurred, when known.
#[derive(Debug, Clone, Default)]
pub struct SourceLocation {
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
        }
    }
}

/// The candidates the resolver tried before giving up on a request.
#[derive(Debug, Clone)]
pub struct Unresolved {
    pub from: PathBuf,
    pub request: String,
    pub candidates: Vec<PathBuf>,
}

impl std::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot resolve '{}' from {} (tried {} candidate{})",
            self.request,
            self.from.display(),
            self.candidates.len(),
            if self.candidates.len() == 1 { "" } else { "s" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    Syntax,
    Plugin,
}

/// Permanent-until-source-changes failure from a transform worker.
#[derive(Debug, Clone)]
pub struct TransformError {
    pub path: PathBuf,
    pub kind: TransformErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)?;
        if let Some(loc) = &self.location {
            if let (Some(line), Some(col)) = (loc.line, loc.column) {
                write!(f, " ({}:{})", line, col)?;
            }
        }
        Ok(())
    }
}

/// Enhanced error with file location context, rendered by `format_detailed`.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code_snippet: Option<String>,
}

impl ErrorContext {
    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Unresolved(Unresolved),

    #[error("transform failed: {0}")]
    Transform(TransformError),

    #[error("transform failed in {} module(s)", .0.len())]
    TransformBatch(Vec<TransformError>),

    #[error("watcher failed to become ready within the startup timeout")]
    WatcherTimeout,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cache entry for key {0} failed its checksum, discarding")]
    CacheCorrupt(String),

    #[error("session has already ended")]
    SessionEnded,

    #[error("circular dependency detected while ordering modules: {0}")]
    Cycle(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl From<Unresolved> for BundlerError {
    fn from(u: Unresolved) -> Self {
        BundlerError::Unresolved(u)
    }
}

impl From<TransformError> for BundlerError {
    fn from(e: TransformError) -> Self {
        BundlerError::Transform(e)
    }
}

impl BundlerError {
    pub fn config(message: impl Into<String>) -> Self {
        BundlerError::Config(message.into())
    }

    /// Format with file/location context, the way a terminal reporter would.
    pub fn format_detailed(&self) -> String {
        match self {
            BundlerError::Transform(e) => {
                let mut ctx = ErrorContext::default().with_file(e.path.clone());
                if let Some(loc) = &e.location {
                    if let (Some(l), Some(c)) = (loc.line, loc.column) {
                        ctx = ctx.with_location(l, c);
                    }
                }
                Self::format_with_context("Transform error", &e.message, &ctx)
            }
            BundlerError::Unresolved(u) => {
                let ctx = ErrorContext::default().with_file(u.from.clone());
                Self::format_with_context("Unresolved", &self.to_string(), &ctx)
            }
            _ => self.to_string(),
        }
    }

    fn format_with_context(kind: &str, message: &str, ctx: &ErrorContext) -> String {
        let mut out = format!("{kind}: {message}");
        if let Some(path) = &ctx.file_path {
            out.push_str(&format!("\n  at {}", path.display()));
            if let (Some(l), Some(c)) = (ctx.line, ctx.column) {
                out.push_str(&format!(":{l}:{c}"));
            }
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, BundlerError>;
