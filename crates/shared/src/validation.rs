//! Struct validation helpers.
//!
//! [`validate`] runs the `validator` derive rules and flattens every failure
//! into one readable message, e.g. `email is 'email' and secret is 'secret_too_short'`.

use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Minimum length in bytes of a shared signing secret (256 bits).
pub const MIN_SECRET_LEN: usize = 32;

/// Aggregated validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationFailure {
    message: String,
}

impl ValidationFailure {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ValidationErrors> for ValidationFailure {
    fn from(errors: ValidationErrors) -> Self {
        let mut failures = Vec::new();
        collect_failures("", &errors, &mut failures);
        failures.sort();

        let message = failures
            .iter()
            .map(|(field, code)| format!("{} is '{}'", field, code))
            .collect::<Vec<_>>()
            .join(" and ");

        Self { message }
    }
}

/// Validates `data`, reporting every failed field in a single message.
pub fn validate<T: Validate>(data: &T) -> Result<(), ValidationFailure> {
    data.validate().map_err(ValidationFailure::from)
}

fn collect_failures(prefix: &str, errors: &ValidationErrors, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    out.push((path.clone(), error.code.to_string()));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_failures(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_failures(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

/// Validates that a signing secret is long enough.
pub fn validate_secret_strength(secret: &str) -> Result<(), ValidationError> {
    if secret.len() >= MIN_SECRET_LEN {
        Ok(())
    } else {
        let mut err = ValidationError::new("secret_too_short");
        err.message = Some(format!("Secret must be at least {} bytes", MIN_SECRET_LEN).into());
        Err(err)
    }
}

/// Validates that a string contains something other than whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}
