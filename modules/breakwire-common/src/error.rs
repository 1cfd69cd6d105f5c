use thiserror::Error;

#[derive(Error, Debug)]
pub enum BreakwireError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Illegal story transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl BreakwireError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
