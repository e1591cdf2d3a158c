//! Client-side input checks, applied before any remote call.

use crate::constants::{
    MAX_BIO_LEN, MAX_COMMENT_LEN, MAX_DISPLAY_NAME_LEN, MAX_MESSAGE_LEN, MAX_NOTE_TITLE_LEN,
    PASSWORD_MIN_LEN, USERNAME_MAX_LEN, USERNAME_MIN_LEN,
};
use crate::error::ValidationError;

/// Trim a chat message. `Ok(None)` means there is nothing to send.
pub fn message_text(text: &str) -> Result<Option<&str>, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    max_len("Message", trimmed, MAX_MESSAGE_LEN)?;
    Ok(Some(trimmed))
}

pub fn comment_text(text: &str) -> Result<&str, ValidationError> {
    let trimmed = required("Comment", text)?;
    max_len("Comment", trimmed, MAX_COMMENT_LEN)?;
    Ok(trimmed)
}

pub fn note_title(title: &str) -> Result<&str, ValidationError> {
    max_len("Title", title, MAX_NOTE_TITLE_LEN)?;
    Ok(title)
}

pub fn username(name: &str) -> Result<&str, ValidationError> {
    let name = required("Username", name)?;
    let len = name.chars().count();
    if len < USERNAME_MIN_LEN {
        return Err(ValidationError::TooShort {
            field: "Username",
            min: USERNAME_MIN_LEN,
        });
    }
    if len > USERNAME_MAX_LEN {
        return Err(ValidationError::TooLong {
            field: "Username",
            max: USERNAME_MAX_LEN,
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(name)
}

/// Lenient format check used by lookups: a malformed handle is "not found".
pub fn is_valid_username(name: &str) -> bool {
    username(name).is_ok()
}

pub fn display_name(name: &str) -> Result<&str, ValidationError> {
    let name = required("Display name", name)?;
    max_len("Display name", name, MAX_DISPLAY_NAME_LEN)?;
    Ok(name)
}

/// Empty bios are stored as `None`.
pub fn bio(bio: &str) -> Result<Option<&str>, ValidationError> {
    let bio = bio.trim();
    if bio.is_empty() {
        return Ok(None);
    }
    max_len("Bio", bio, MAX_BIO_LEN)?;
    Ok(Some(bio))
}

pub fn email(email: &str) -> Result<&str, ValidationError> {
    let email = required("Email", email)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ValidationError::InvalidEmail),
    }
}

pub fn password(password: &str) -> Result<&str, ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Required("Password"));
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ValidationError::TooShort {
            field: "Password",
            min: PASSWORD_MIN_LEN,
        });
    }
    Ok(password)
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Required(field))
    } else {
        Ok(trimmed)
    }
}

fn max_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        Err(ValidationError::TooLong { field, max })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_message_is_nothing_to_send() {
        assert_eq!(message_text("   \n\t"), Ok(None));
        assert_eq!(message_text(""), Ok(None));
        assert_eq!(message_text("  hi  "), Ok(Some("hi")));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            message_text(&long),
            Err(ValidationError::TooLong { field: "Message", .. })
        ));
    }

    #[test]
    fn username_rules() {
        assert_eq!(username(" ada_99 "), Ok("ada_99"));
        assert_eq!(username(""), Err(ValidationError::Required("Username")));
        assert!(matches!(username("ab"), Err(ValidationError::TooShort { .. })));
        assert_eq!(username("ada lovelace"), Err(ValidationError::InvalidUsername));
        assert_eq!(username("ada-l"), Err(ValidationError::InvalidUsername));
        assert!(!is_valid_username("../etc"));
    }

    #[test]
    fn email_and_password() {
        assert!(email("ada@example.com").is_ok());
        assert_eq!(email("ada.example.com"), Err(ValidationError::InvalidEmail));
        assert_eq!(email("@example.com"), Err(ValidationError::InvalidEmail));
        assert!(password("secret").is_ok());
        assert!(matches!(password("abc"), Err(ValidationError::TooShort { .. })));
    }

    #[test]
    fn empty_bio_becomes_none() {
        assert_eq!(bio("   "), Ok(None));
        assert_eq!(bio(" hello "), Ok(Some("hello")));
        assert!(bio(&"b".repeat(MAX_BIO_LEN + 1)).is_err());
    }

    #[test]
    fn comment_must_have_text() {
        assert_eq!(comment_text("  "), Err(ValidationError::Required("Comment")));
        assert_eq!(comment_text(" nice "), Ok("nice"));
    }
}
