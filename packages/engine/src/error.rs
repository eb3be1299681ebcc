use thiserror::Error;

use crate::errors::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {title}: {description}")]
pub struct LixError {
    pub code: String,
    pub title: String,
    pub description: String,
}

impl LixError {
    pub fn new(code: &str, title: &str, description: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            title: title.to_string(),
            description: description.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// True when the error was built from `code`.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.as_str()
    }
}

impl From<serde_json::Error> for LixError {
    fn from(error: serde_json::Error) -> Self {
        crate::errors::serialization_error(&error.to_string())
    }
}

impl From<zip::result::ZipError> for LixError {
    fn from(error: zip::result::ZipError) -> Self {
        crate::errors::image_invalid_error(&error.to_string())
    }
}

impl From<std::io::Error> for LixError {
    fn from(error: std::io::Error) -> Self {
        crate::errors::image_invalid_error(&error.to_string())
    }
}
