//! Input validation for player-supplied names, passwords and free text.

use std::collections::HashSet;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_NAME_LENGTH: usize = 60;
pub const MAX_TEXT_LENGTH: usize = 2000;

/// Username validation errors with helpful messages
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsernameError {
    #[error("Username is too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("Username is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Username cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Username contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("Username is a reserved name")]
    Reserved,
}

/// Errors for other player-supplied text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Password must be at most {max} characters")]
    PasswordTooLong { max: usize },

    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long (maximum {max} characters)")]
    TooLong { field: &'static str, max: usize },
}

#[derive(Debug, Clone)]
pub struct UsernameRules {
    pub min_length: usize,
    pub max_length: usize,
    pub allow_spaces: bool,
    pub allow_unicode: bool,
}

impl Default for UsernameRules {
    fn default() -> Self {
        UsernameRules {
            min_length: 3,
            max_length: 30,
            allow_spaces: false,
            allow_unicode: true,
        }
    }
}

fn reserved_names() -> HashSet<&'static str> {
    [
        "admin", "administrator", "root", "system", "server", "moderator", "gm",
        "gamemaster", "king", "realm", "null", "undefined", "anonymous", "guest",
    ]
    .iter()
    .copied()
    .collect()
}

/// Validate a username according to the given rules
pub fn validate_username(username: &str, rules: &UsernameRules) -> Result<String, UsernameError> {
    let trimmed = username.trim();

    if trimmed != username {
        return Err(UsernameError::InvalidWhitespace);
    }
    let length = trimmed.chars().count();
    if length < rules.min_length {
        return Err(UsernameError::TooShort {
            min: rules.min_length,
        });
    }
    if length > rules.max_length {
        return Err(UsernameError::TooLong {
            max: rules.max_length,
        });
    }

    if reserved_names().contains(trimmed.to_lowercase().as_str()) {
        return Err(UsernameError::Reserved);
    }

    let mut invalid: Vec<char> = trimmed
        .chars()
        .filter(|&ch| {
            let valid = if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
                true
            } else if ch == ' ' {
                rules.allow_spaces
            } else if ch.is_alphanumeric() && !ch.is_ascii() {
                rules.allow_unicode
            } else {
                false
            };
            !valid
        })
        .collect();

    if !invalid.is_empty() {
        invalid.sort_unstable();
        invalid.dedup();
        let chars = invalid
            .into_iter()
            .map(|c| {
                if c.is_control() {
                    format!("\\u{{{:04x}}}", c as u32)
                } else {
                    c.to_string()
                }
            })
            .collect::<String>();
        return Err(UsernameError::InvalidCharacters { chars });
    }

    Ok(trimmed.to_string())
}

/// Validate a player username with the default rules.
pub fn validate_player_name(name: &str) -> Result<String, UsernameError> {
    validate_username(name, &UsernameRules::default())
}

pub fn validate_password(password: &str) -> Result<(), TextError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(TextError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(TextError::PasswordTooLong {
            max: MAX_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

/// Trim a display name (army, kingdom, guild, ...) and enforce length limits.
pub fn validate_display_name(field: &'static str, value: &str) -> Result<String, TextError> {
    bounded_text(field, value, MAX_NAME_LENGTH)
}

/// Trim free text (descriptions, chat lines) and strip control characters other
/// than newline and tab.
pub fn sanitize_text(field: &'static str, value: &str) -> Result<String, TextError> {
    let cleaned: String = value
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .collect();
    bounded_text(field, &cleaned, MAX_TEXT_LENGTH)
}

/// Like [`sanitize_text`] but blank input is allowed and comes back empty.
pub fn sanitize_optional_text(field: &'static str, value: &str) -> Result<String, TextError> {
    if value.trim().is_empty() {
        return Ok(String::new());
    }
    sanitize_text(field, value)
}

fn bounded_text(field: &'static str, value: &str, max: usize) -> Result<String, TextError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TextError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(TextError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}
