//! Per-stage error types, composed behind `anyhow::Error` at the CLI boundary.

use thiserror::Error;

/// Failures building a match tree or the surrounding trial tree out of a raw payload.
#[derive(Error, Debug, Clone)]
pub enum BuildError {
    #[error("junction node has no children")]
    EmptyJunction,
    #[error("leaf criterion carries neither a clinical nor genomic map")]
    UnrecognizedLeaf,
    #[error("trial {protocol_no} has no treatment_list.step entries")]
    EmptyTreatmentList { protocol_no: String },
}

/// Failures compiling a single leaf criterion into a query plan.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("malformed age predicate: {0}")]
    InvalidAgePredicate(String),
}

/// Failures reported while querying the store for a leaf's matching rows.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("permanent store failure: {0}")]
    Permanent(String),
}

/// Failures evaluating a built match tree against the store.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures driving a single trial end to end; the batch runner catches these per trial
/// and logs them so the rest of the batch proceeds, except for a fatal sink write.
#[derive(Error, Debug, Clone)]
pub enum DriveError {
    #[error("protocol {protocol_no}: {source}")]
    Build {
        protocol_no: String,
        #[source]
        source: BuildError,
    },
    #[error("protocol {protocol_no}: {source}")]
    Eval {
        protocol_no: String,
        #[source]
        source: EvalError,
    },
    #[error("protocol {protocol_no}: fatal sink failure: {source}")]
    FatalSink {
        protocol_no: String,
        #[source]
        source: StoreError,
    },
}

impl DriveError {
    /// Whether the batch runner should abort the whole batch on this error, rather than
    /// skip the offending trial and continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriveError::FatalSink { .. })
    }
}
