//! Request Validation Module
//!
//! Provides request validation for names and free text that reach the filesystem or the model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Validation error types
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}' is too long (max: {max}, got: {got})")]
    TooLong {
        field: String,
        max: usize,
        got: usize,
    },

    #[error("Field '{field}' is too short (min: {min}, got: {got})")]
    TooShort {
        field: String,
        min: usize,
        got: usize,
    },

    #[error("Field '{field}' contains invalid characters: {chars}")]
    InvalidCharacters { field: String, chars: String },

    #[error("Field '{field}' is a reserved name: {value}")]
    Reserved { field: String, value: String },
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Validation result type
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Request validator implementation
#[derive(Debug, Clone, Default)]
pub struct RequestValidator;

impl RequestValidator {
    /// Validate field length in characters
    pub fn validate_length(
        &self,
        field: &str,
        value: &str,
        min: Option<usize>,
        max: Option<usize>,
    ) -> ValidationResult<()> {
        let length = value.chars().count();

        if let Some(min_len) = min {
            if length < min_len {
                return Err(ValidationError::TooShort {
                    field: field.to_string(),
                    min: min_len,
                    got: length,
                });
            }
        }

        if let Some(max_len) = max {
            if length > max_len {
                return Err(ValidationError::TooLong {
                    field: field.to_string(),
                    max: max_len,
                    got: length,
                });
            }
        }

        Ok(())
    }

    /// Reject any of the given characters and all control characters
    pub fn validate_forbidden_chars(
        &self,
        field: &str,
        value: &str,
        forbidden: &[char],
    ) -> ValidationResult<()> {
        let invalid: String = value
            .chars()
            .filter(|c| forbidden.contains(c) || c.is_control())
            .collect();

        if !invalid.is_empty() {
            Err(ValidationError::InvalidCharacters {
                field: field.to_string(),
                chars: invalid.escape_debug().to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Common validation helpers
pub mod validators {
    use super::*;

    /// Validate a knowledge source name; it becomes a directory name under the knowledge root
    pub fn validate_source_name(name: &str) -> ValidationResult<()> {
        let validator = RequestValidator;
        validator.validate_length("name", name, Some(1), Some(128))?;
        validator.validate_forbidden_chars(
            "name",
            name,
            &['/', '\\', ':', '*', '?', '"', '<', '>', '|'],
        )?;
        if name == "." || name == ".." || name.trim() != name {
            return Err(ValidationError::Reserved {
                field: "name".to_string(),
                value: name.to_string(),
            });
        }
        Ok(())
    }

    /// Validate user query text
    pub fn validate_query(query: &str) -> ValidationResult<()> {
        let validator = RequestValidator;
        validator.validate_length("text", query.trim(), Some(1), Some(100_000))
    }

    /// Validate text appended to a knowledge source
    pub fn validate_passage(text: &str) -> ValidationResult<()> {
        let validator = RequestValidator;
        validator.validate_length("text", text.trim(), Some(1), Some(1_000_000))
    }
}

#[cfg(test)]
mod tests {
    use super::validators::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("manuals")]
    #[case("Руководства 2024")]
    #[case("faq.v2")]
    fn test_valid_source_names(#[case] name: &str) {
        assert!(validate_source_name(name).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("../escape")]
    #[case("a/b")]
    #[case("tab\tname")]
    #[case(" padded ")]
    fn test_invalid_source_names(#[case] name: &str) {
        assert!(validate_source_name(name).is_err());
    }

    #[test]
    fn test_length_limits() {
        let validator = RequestValidator;
        assert!(matches!(
            validator.validate_length("name", "", Some(1), Some(4)),
            Err(ValidationError::TooShort { .. })
        ));
        assert!(matches!(
            validator.validate_length("name", "abcde", Some(1), Some(4)),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(validator.validate_length("name", "abcd", Some(1), Some(4)).is_ok());
    }

    #[test]
    fn test_blank_query_is_rejected() {
        assert!(validate_query("   ").is_err());
        assert!(validate_query("what is rust?").is_ok());
    }
}
