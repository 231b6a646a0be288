use regex::Regex;

use crate::types::ValidationError;

lazy_static! {
    static ref USERNAME_RE: Regex = {
        let pattern = r"\A[\w.@+-]{1,150}\z";
        Regex::new(pattern).unwrap()
    };
}

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_username_re(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_RE.is_match(username) {
        Err(ValidationError::from(
            "username",
            format!("Invalid username: {}", username),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        let e = ValidationError::from("password", "Password too short");
        Err(e)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_allow_word_characters_and_symbols() {
        assert!(validate_username_re("leo.tolstoy+1@home").is_ok());
        assert!(validate_username_re("").is_err());
        assert!(validate_username_re("with space").is_err());
        assert!(validate_username_re("slash/name").is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }
}
