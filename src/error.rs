use std::fmt;

pub type DbResult<T, E = Error> = Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The native database handle (or a connection derived from it) could not
    /// be created.
    #[error("failed to initialize engine for `{target}`: {message}")]
    EngineInitialization { target: String, message: String },

    /// The number of bind values differs from the number of placeholders.
    #[error("bind arity mismatch: statement expects {expected} parameters, but {actual} were given")]
    BindArity { expected: usize, actual: usize },

    /// The engine rejected the value bound at the given (1-based) position.
    #[error("failed to bind parameter {position}: {message}")]
    Bind { position: usize, message: String },

    /// The engine failed to prepare or execute a statement.
    #[error("query failed ({kind}): {message}")]
    QueryExecution { kind: FailureKind, message: String },

    /// A stored value could not be converted into the requested type.
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    /// The row has no column with the given name.
    #[error("no such column `{0}`")]
    UnknownColumn(String),

    /// A value could not be encoded into a cell.
    #[error("encode error: {0}")]
    Encode(String),

    /// The connection was already closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The connection is still serving an unfinished row stream.
    #[error("connection is busy with an unfinished row stream")]
    ConnectionBusy,

    /// The worker pool no longer accepts work.
    #[error("worker pool is shut down")]
    WorkerPoolShutdown,

    /// A worker task panicked or was aborted.
    #[error("worker failed: {0}")]
    Worker(String),

    /// The receiving side of a row stream went away.
    #[error("row receiver dropped")]
    Delivery,
}

/// Coarse classification of engine failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Syntax,
    ConnectionClosed,
    Constraint,
    Other,
}

/// Statement lifecycle stage an engine error was raised from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Stage {
    Prepare,
    Execute,
}

impl FailureKind {
    /// Classifies an engine diagnostic by its error-class prefix.
    pub fn classify(message: &str) -> Option<FailureKind> {
        const SYNTAX: [&str; 3] = ["Parser Error", "Binder Error", "Catalog Error"];

        let message = message.trim_start();
        if SYNTAX.iter().any(|prefix| message.starts_with(prefix)) {
            Some(FailureKind::Syntax)
        } else if message.starts_with("Constraint Error") {
            Some(FailureKind::Constraint)
        } else if message.starts_with("Connection Error")
            || message.contains("connection has been closed")
            || message.contains("Connection has already been closed")
        {
            Some(FailureKind::ConnectionClosed)
        } else {
            None
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Syntax => "syntax",
            FailureKind::ConnectionClosed => "connection closed",
            FailureKind::Constraint => "constraint",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Builds a [`Error::QueryExecution`] from an engine error raised at the
    /// given stage. Unclassified prepare failures count as syntax errors.
    pub(crate) fn query(stage: Stage, error: duckdb::Error) -> Error {
        let message = error.to_string();
        let kind = match (FailureKind::classify(&message), stage) {
            (Some(kind), _) => kind,
            (None, Stage::Prepare) => FailureKind::Syntax,
            (None, Stage::Execute) => FailureKind::Other,
        };
        Error::QueryExecution { kind, message }
    }

    /// Builds a [`Error::TypeMismatch`] for a value of type `found` requested
    /// as `target`.
    pub(crate) fn mismatch(found: &str, target: &str) -> Error {
        Error::TypeMismatch {
            message: format!("cannot convert `{found}` value into `{target}`"),
        }
    }

    /// Returns the failure kind, if this is a query execution error.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::QueryExecution { kind, .. } => Some(*kind),
            Error::ConnectionClosed => Some(FailureKind::ConnectionClosed),
            _ => None,
        }
    }

    pub fn is_syntax_error(&self) -> bool {
        self.failure_kind() == Some(FailureKind::Syntax)
    }

    pub fn is_connection_closed(&self) -> bool {
        self.failure_kind() == Some(FailureKind::ConnectionClosed)
    }

    pub fn is_constraint_failure(&self) -> bool {
        self.failure_kind() == Some(FailureKind::Constraint)
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Encode(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::TypeMismatch {
            message: msg.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let cases = [
            ("Parser Error: syntax error at or near \"SELEC\"", Some(FailureKind::Syntax)),
            ("Binder Error: Referenced column \"x\" not found", Some(FailureKind::Syntax)),
            ("Catalog Error: Table with name t does not exist!", Some(FailureKind::Syntax)),
            ("Constraint Error: Duplicate key \"id: 1\"", Some(FailureKind::Constraint)),
            ("Connection Error: Connection has already been closed", Some(FailureKind::ConnectionClosed)),
            ("Invalid Input Error: nope", None),
        ];
        for (message, expected) in cases {
            assert_eq!(FailureKind::classify(message), expected, "{message}");
        }
    }

    #[test]
    fn test_predicates() {
        let error = Error::QueryExecution {
            kind: FailureKind::Constraint,
            message: "Constraint Error: NOT NULL constraint failed".into(),
        };
        assert!(error.is_constraint_failure());
        assert!(!error.is_syntax_error());
        assert!(Error::ConnectionClosed.is_connection_closed());
        assert_eq!(Error::Delivery.failure_kind(), None);
        assert_eq!(Error::ConnectionBusy.failure_kind(), None);
    }
}
