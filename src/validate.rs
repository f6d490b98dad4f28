//! DTO validation.
//!
//! DTOs declare their constraints by implementing [`Validate`], usually by
//! chaining the helpers in [`rules`] with `?`. The first violated rule wins.

use std::fmt;

/// A violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field '{field}' failed '{rule}' rule: {message}")]
pub struct ValidationError {
    pub field: String,
    pub rule: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// Checks a value against its declared constraints.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Reusable field rules.
pub mod rules {
    use super::*;

    /// Non-empty after trimming.
    pub fn required(field: &str, value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new(field, "required", "must not be empty"));
        }
        Ok(())
    }

    /// Character count within `[min, max]`.
    pub fn length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
        let len = value.chars().count();
        if len < min || len > max {
            return Err(ValidationError::new(
                field,
                "length",
                format!("length {} not within {}..={}", len, min, max),
            ));
        }
        Ok(())
    }

    /// A single `@` with a non-empty local part and a dotted domain.
    pub fn email(field: &str, value: &str) -> Result<(), ValidationError> {
        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !value.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(ValidationError::new(
                field,
                "email",
                format!("'{}' is not a valid email address", value),
            ));
        }
        Ok(())
    }

    /// Inclusive numeric range.
    pub fn range<T>(field: &str, value: T, min: T, max: T) -> Result<(), ValidationError>
    where
        T: PartialOrd + fmt::Display + Copy,
    {
        if value < min || value > max {
            return Err(ValidationError::new(
                field,
                "range",
                format!("{} not within {}..={}", value, min, max),
            ));
        }
        Ok(())
    }
}
