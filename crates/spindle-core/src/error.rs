use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpindleError {
    // Authoring errors — raised synchronously from graph mutations and
    // recovered by the caller; they never surface during a run.
    #[error("item name already taken: {0}")]
    NameTaken(String),

    #[error("connection {src} -> {dst} would create a cycle")]
    CycleWould { src: String, dst: String },

    #[error("invalid item specification: {0}")]
    InvalidSpec(String),

    #[error("unknown item: {0}")]
    UnknownItem(String),

    #[error("connection {src} -> {dst} already exists")]
    DuplicateEdge { src: String, dst: String },

    // Planning errors — abort the run before any unit executes.
    #[error("tool item {item} has no specification")]
    MissingSpecification { item: String },

    #[error("no predecessor of {item} provides required resource: {label}")]
    UnreachableResource { item: String, label: String },

    #[error("{kind} filter '{value}' enabled on {src} -> {dst} but {src} provides no such value")]
    FilterUnavailable {
        kind: String,
        value: String,
        src: String,
        dst: String,
    },

    #[error("planning failed:\n{0}")]
    Planning(String),

    // Execution errors — reported per unit; dependents are skipped.
    #[error("tool {item} exited with code {code}")]
    ToolExited { item: String, code: i32 },

    #[error("database commit failed: {0}")]
    DatabaseCommitFailed(String),

    #[error("file not found for resource '{label}': {path}")]
    FileNotFound { label: String, path: String },

    #[error("run cancelled")]
    Cancelled,

    // Internal invariants — bug class, fatal.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    // Project / config errors
    #[error("project error: {0}")]
    Project(String),

    #[error("config error: {0}")]
    Config(String),

    // Storage errors
    #[error("database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SpindleError>;
