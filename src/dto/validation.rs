//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::{
    game::YearRange,
    registry::{CODE_LENGTH, is_code_shaped},
};

/// Validates that a room code has the shape handed out by the server.
///
/// Lower-case input is accepted; lookups normalize it.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("K7MPQ2") // Ok
/// validate_room_code("k7mpq2") // Ok
/// validate_room_code("K7MPQ")  // Err - too short
/// validate_room_code("K7MPQ0") // Err - `0` is never issued
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    let trimmed = code.trim();
    if trimmed.len() != CODE_LENGTH {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be exactly {CODE_LENGTH} characters (got {})",
                trimmed.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !is_code_shaped(trimmed) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code contains characters that are never issued".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a start-year range is not inverted.
pub fn validate_year_range(range: &YearRange) -> Result<(), ValidationError> {
    if range.is_valid() {
        return Ok(());
    }
    let mut err = ValidationError::new("year_range_order");
    err.message = Some(format!("min ({}) must not exceed max ({})", range.min, range.max).into());
    Err(err)
}

/// Validates that a display name contains something besides whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_code_valid() {
        assert!(validate_room_code("K7MPQ2").is_ok());
        assert!(validate_room_code("k7mpq2").is_ok());
        assert!(validate_room_code(" ABCDEF ").is_ok());
    }

    #[test]
    fn test_validate_room_code_invalid_length() {
        assert!(validate_room_code("ABCDE").is_err());
        assert!(validate_room_code("ABCDEFG").is_err());
        assert!(validate_room_code("").is_err());
    }

    #[test]
    fn test_validate_room_code_invalid_format() {
        assert!(validate_room_code("ABCDE0").is_err()); // zero
        assert!(validate_room_code("ABCDEI").is_err()); // ambiguous I
        assert!(validate_room_code("ABC-EF").is_err());
    }

    #[test]
    fn test_validate_year_range() {
        assert!(validate_year_range(&YearRange { min: 1970, max: 1970 }).is_ok());
        assert!(validate_year_range(&YearRange { min: 1990, max: 1980 }).is_err());
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("Ziggy").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }
}
