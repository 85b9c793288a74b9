//! Client-side checks. Everything here runs before any network call.

use crate::error::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 6;

/// `local@domain.tld`, no whitespace.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    let labels: Vec<&str> = domain.split('.').collect();
    let valid = !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && labels.len() >= 2
        && labels.iter().all(|l| !l.is_empty());

    if valid { Ok(()) } else { Err(ValidationError::InvalidEmail) }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

pub fn validate_sign_in(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_email(email)?;
    validate_password(password)
}

pub fn validate_sign_up(email: &str, password: &str, full_name: &str) -> Result<(), ValidationError> {
    validate_sign_in(email, password)?;
    if full_name.trim().is_empty() {
        return Err(ValidationError::MissingFullName);
    }
    Ok(())
}

/// Both coordinates must be set; a zero in either means the location was
/// never captured.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ValidationError> {
    if latitude == 0.0 || longitude == 0.0 {
        return Err(ValidationError::MissingLocation);
    }
    if !latitude.is_finite()
        || !longitude.is_finite()
        || latitude.abs() > 90.0
        || longitude.abs() > 180.0
    {
        return Err(ValidationError::LocationOutOfRange);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email(" ana@example.com ").is_ok());
        for bad in ["", "ana", "ana@", "@example.com", "ana@example", "ana@@example.com", "a na@example.com"] {
            assert_eq!(validate_email(bad), Err(ValidationError::InvalidEmail), "{}", bad);
        }
    }

    #[test]
    fn sign_up_checks_in_order() {
        assert_eq!(validate_sign_up("bad", "123", ""), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_sign_up("a@b.co", "12345", ""), Err(ValidationError::PasswordTooShort));
        assert_eq!(validate_sign_up("a@b.co", "123456", "  "), Err(ValidationError::MissingFullName));
        assert!(validate_sign_up("a@b.co", "123456", "Ana").is_ok());
    }

    #[test]
    fn zero_coordinates_mean_no_location() {
        assert_eq!(validate_coordinates(0.0, 0.0), Err(ValidationError::MissingLocation));
        assert_eq!(validate_coordinates(10.0, 0.0), Err(ValidationError::MissingLocation));
        assert_eq!(validate_coordinates(0.0, 10.0), Err(ValidationError::MissingLocation));
        assert_eq!(validate_coordinates(91.0, 10.0), Err(ValidationError::LocationOutOfRange));
        assert_eq!(validate_coordinates(f64::NAN, 10.0), Err(ValidationError::LocationOutOfRange));
        assert!(validate_coordinates(-33.45, -70.66).is_ok());
    }
}
