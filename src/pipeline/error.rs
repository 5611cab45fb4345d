use std::fmt::Display;

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ImportError {
    /// The file could not be read or parsed as delimited text.
    Format(String),
    /// Required columns are absent.
    Schema { missing: Vec<String>, found: Vec<String> },
    /// A date or numeric field failed strict parsing.
    Validation(String),
    /// The record store rejected a delete or insert.
    Store(String),
}

impl ImportError {
    pub fn validation<S: Into<String>>(msg: S) -> ImportError {
        ImportError::Validation(msg.into())
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Format(msg) => write!(f, "Format error: {msg}"),
            ImportError::Schema { missing, found } => write!(
                f,
                "Missing required columns: {}. Found columns: {}",
                missing.join(", "),
                found.join(", ")
            ),
            ImportError::Validation(msg) => write!(f, "Validation error: {msg}"),
            ImportError::Store(msg) => write!(f, "Store error: {msg}"),
        }
    }
}
