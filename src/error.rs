use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failures surfaced by registrar operations. Each variant maps to one IPC error code.
#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("select a workspace first")]
    NoWorkspace,

    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    NotFound(String),

    /// A uniqueness or referential business rule was violated.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("the given data was invalid")]
    Validation(FieldErrors),

    #[error("{message}")]
    Import { message: String },

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    OpenFailed(String),

    #[error("{source}")]
    Db {
        code: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl From<rusqlite::Error> for RegistrarError {
    fn from(source: rusqlite::Error) -> Self {
        RegistrarError::Db {
            code: "db_query_failed",
            source,
        }
    }
}

impl RegistrarError {
    pub fn db(code: &'static str, source: rusqlite::Error) -> Self {
        RegistrarError::Db { code, source }
    }

    pub fn not_found(what: &str) -> Self {
        RegistrarError::NotFound(format!("{what} not found"))
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.into()]);
        RegistrarError::Validation(fields)
    }

    pub fn code(&self) -> &'static str {
        match self {
            RegistrarError::NoWorkspace => "no_workspace",
            RegistrarError::BadParams(_) => "bad_params",
            RegistrarError::NotFound(_) => "not_found",
            RegistrarError::Conflict(_) => "conflict",
            RegistrarError::InvalidTransition(_) => "invalid_transition",
            RegistrarError::Forbidden(_) => "forbidden",
            RegistrarError::Validation(_) => "validation_failed",
            RegistrarError::Import { .. } => "import_failed",
            RegistrarError::Io(_) => "io_failed",
            RegistrarError::OpenFailed(_) => "db_open_failed",
            RegistrarError::Db { code, .. } => *code,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            RegistrarError::Validation(fields) => Some(json!({ "fields": fields })),
            _ => None,
        }
    }
}

/// Collects per-field messages so a whole form is reported at once.
#[derive(Debug, Default)]
pub struct Validator {
    fields: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> FieldErrors {
        self.fields
    }

    pub fn finish(self) -> Result<(), RegistrarError> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(RegistrarError::Validation(self.fields))
        }
    }
}
