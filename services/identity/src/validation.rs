//! Input validation utilities

use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

use crate::error::FieldErrors;
use crate::models::ParseEnumError;

pub const EMAIL_MAX_LEN: usize = 48;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const NAME_MAX_LEN: usize = 30;
pub const PHONE_MAX_LEN: usize = 24;
pub const ORG_ID_MAX_LEN: usize = 16;

pub const REQUIRED: &str = "This field is required.";

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err(REQUIRED.to_string());
    }

    if email.chars().count() > EMAIL_MAX_LEN {
        return Err(max_len_message(EMAIL_MAX_LEN));
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Enter a valid email address.".to_string());
    }

    Ok(())
}

/// Validate password. Only presence and length are enforced; strength
/// policy is left to the deployment.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err(REQUIRED.to_string());
    }

    if password.chars().count() > PASSWORD_MAX_LEN {
        return Err(max_len_message(PASSWORD_MAX_LEN));
    }

    Ok(())
}

/// Validate an explicitly supplied organization identifier
pub fn validate_org_id(org_id: &str) -> Result<(), String> {
    if org_id.is_empty() {
        return Err(REQUIRED.to_string());
    }

    if org_id.chars().count() > ORG_ID_MAX_LEN {
        return Err(max_len_message(ORG_ID_MAX_LEN));
    }

    static SLUG_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = SLUG_REGEX
        .get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("Failed to compile slug regex"));

    if !regex.is_match(org_id) {
        return Err(
            "Enter a valid slug consisting of letters, numbers, underscores or hyphens."
                .to_string(),
        );
    }

    Ok(())
}

/// Whether a URL path segment looks like an email address.
pub fn is_email_path(segment: &str) -> bool {
    static PATH_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PATH_REGEX
        .get_or_init(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("Failed to compile path regex"));
    regex.is_match(segment)
}

/// Emails are stored and looked up trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Derive a URL-safe identifier from a display name, capped at the org id length.
///
/// Folds accents via NFKD and lowercases, drops anything that is not an ASCII
/// word character, whitespace or hyphen, then collapses whitespace/hyphen
/// runs into single hyphens.
pub fn slugify(value: &str) -> String {
    let folded: String = value.nfkd().filter(char::is_ascii).collect();
    let kept: String = folded
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let mut slug = String::with_capacity(kept.len());
    let mut pending_dash = false;
    for c in kept.trim().chars() {
        if c == '-' || c.is_whitespace() {
            pending_dash = true;
            continue;
        }
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(c);
    }

    let capped: String = slug.chars().take(ORG_ID_MAX_LEN).collect();
    capped.trim_matches(|c| c == '-' || c == '_').to_string()
}

pub fn max_len_message(max: usize) -> String {
    format!("Ensure this field has no more than {} characters.", max)
}

/// Record a max-length violation for `field`.
pub fn check_max_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(field, max_len_message(max));
    }
}

/// Take a required, non-blank string field.
pub fn require(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => {
            errors.add(field, REQUIRED);
            None
        }
    }
}

/// Parse one of the closed enums, recording a field error on failure.
pub fn parse_choice<T>(errors: &mut FieldErrors, field: &str, raw: &str) -> Option<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.add(field, format!("\"{}\" is not a valid choice.", raw));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrgType;

    #[test]
    fn slugify_matches_expected_forms() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
        assert_eq!(slugify("Client 1"), "client-1");
        assert_eq!(slugify("  Hello,  World!  "), "hello-world");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("Ünïcode Inc"), "unicode-inc");
        assert_eq!(slugify("Café Crème"), "cafe-creme");
        assert_eq!(slugify("ﬁne Ⅸ"), "fine-ix");
        assert_eq!(slugify("東京"), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn slugify_caps_length_without_trailing_dash() {
        let slug = slugify("International Business Machines");
        assert!(slug.len() <= ORG_ID_MAX_LEN);
        assert_eq!(slug, "international-bu");

        assert_eq!(slugify("abcdefghijklmno pq"), "abcdefghijklmno");
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("a@x.io").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        let long = format!("{}@example.com", "a".repeat(40));
        assert_eq!(validate_email(&long).unwrap_err(), max_len_message(EMAIL_MAX_LEN));
    }

    #[test]
    fn email_path_segments() {
        assert!(is_email_path("a@x.io"));
        assert!(is_email_path("first.last@sub.example.com"));
        assert!(!is_email_path("42"));
        assert!(!is_email_path("a@b@c.io"));
        assert!(!is_email_path("a@localhost"));
    }

    #[test]
    fn org_id_rules() {
        assert!(validate_org_id("client1").is_ok());
        assert!(validate_org_id("has space").is_err());
        assert!(validate_org_id("seventeen-chars-x").is_err());
    }

    #[test]
    fn password_only_needs_presence() {
        assert!(validate_password("a").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn require_and_choices_collect_errors() {
        let mut errors = FieldErrors::new();
        assert_eq!(require(&mut errors, "name", Some("  Acme ".into())), Some("Acme".into()));
        assert_eq!(require(&mut errors, "phone", Some("   ".into())), None);
        assert_eq!(
            parse_choice::<OrgType>(&mut errors, "org_type", "lvl1"),
            Some(OrgType::Lvl1)
        );
        assert_eq!(parse_choice::<OrgType>(&mut errors, "org_type", "gold"), None);

        assert_eq!(errors.get("phone"), Some(&[REQUIRED.to_string()][..]));
        assert_eq!(
            errors.get("org_type"),
            Some(&["\"gold\" is not a valid choice.".to_string()][..])
        );
        assert!(errors.get("name").is_none());
    }
}
