//! Input validation module
//!
//! Turns `validator` failures into [`AppError::ValidationError`] values whose
//! message keeps every field-level detail, so the audit record shows exactly
//! what was rejected.

use crate::error::{AppError, AppResult};
use crate::models::AreaInput;
use tracing::{debug, warn};
use validator::{Validate, ValidationErrors};

/// Validate area registration input
pub fn validate_area_input(input: &AreaInput) -> AppResult<()> {
    if let Err(validation_errors) = input.validate() {
        let description = describe_validation_errors(&validation_errors);
        warn!(errors = %description, "Area input validation failed");
        return Err(AppError::ValidationError(description));
    }

    validate_area_code(&input.area_code)?;

    debug!("Area input validation passed");
    Ok(())
}

/// Render every field error as `field: message, message` joined by `; `.
///
/// Fields are sorted so the description is stable. Errors without a custom
/// message fall back to their validator code.
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let msgs: Vec<String> = errors
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => e.code.to_string(),
                })
                .collect();
            format!("{}: {}", field, msgs.join(", "))
        })
        .collect();
    fields.sort();
    fields.join("; ")
}

fn validate_area_code(code: &str) -> AppResult<()> {
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::ValidationError(format!(
            "area_code: Area code '{}' must contain only digits",
            code
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, area_code: &str, zip_code: Option<&str>) -> AreaInput {
        AreaInput {
            name: name.to_string(),
            area_code: area_code.to_string(),
            zip_code: zip_code.map(str::to_string),
            parent_id: None,
        }
    }

    #[test]
    fn test_valid_area_input() {
        assert!(validate_area_input(&input("Chengdu", "510100", Some("610000"))).is_ok());
        assert!(validate_area_input(&input("Chengdu", "510100", None)).is_ok());
    }

    #[test]
    fn test_empty_name_is_described_by_field() {
        let result = validate_area_input(&input("", "510100", None));

        match result {
            Err(AppError::ValidationError(msg)) => {
                assert!(msg.contains("name: Name must be between 1 and 64 characters"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_all_failing_fields_are_kept() {
        let result = validate_area_input(&input("", "5", Some("61")));

        let Err(AppError::ValidationError(msg)) = result else {
            panic!("expected validation error");
        };
        assert!(msg.contains("area_code:"));
        assert!(msg.contains("name:"));
        assert!(msg.contains("zip_code:"));
        // sorted by field name
        assert!(msg.find("area_code").unwrap() < msg.find("name").unwrap());
    }

    #[test]
    fn test_non_numeric_area_code() {
        let result = validate_area_input(&input("Chengdu", "51A100", None));

        let Err(AppError::ValidationError(msg)) = result else {
            panic!("expected validation error");
        };
        assert!(msg.contains("51A100"));
    }
}
