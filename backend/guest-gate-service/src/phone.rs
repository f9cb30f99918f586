/// Saudi mobile number canonicalization.
///
/// Every stored or compared phone is in local form `05XXXXXXXX` (10 digits,
/// 11 tolerated). Accepted inputs:
///
/// - `05XXXXXXXX`      already canonical
/// - `5XXXXXXXX`       bare subscriber number
/// - `9665XXXXXXXX`    international without plus
/// - `+9665XXXXXXXX`   international
///
/// Separators (spaces, dashes, dots, parentheses) are ignored.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;

const COUNTRY_CODE: &str = "966";
const TRUNK_PREFIX: char = '0';

// ASCII classes only: `\d` would also match non-ASCII digits.
static SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\s\-.()]").expect("hardcoded separator regex is invalid - fix source code")
});

static BARE_SUBSCRIBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^5[0-9]{8,9}$").expect("hardcoded subscriber regex is invalid - fix source code")
});

static CANONICAL_MOBILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^05[0-9]{8,9}$").expect("hardcoded mobile regex is invalid - fix source code")
});

/// A phone number in canonical local form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Canonicalize raw user input. Returns `None` for anything that is not a
    /// Saudi mobile number; never panics.
    pub fn parse(raw: &str) -> Option<Self> {
        normalize(raw).map(PhoneNumber)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Log-safe form, e.g. `051*****678`.
    pub fn masked(&self) -> String {
        mask(&self.0)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for PhoneNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Normalize to `05XXXXXXXX`, or `None` when the input cannot be a Saudi mobile number.
pub fn normalize(raw: &str) -> Option<String> {
    let stripped = SEPARATORS.replace_all(raw.trim(), "");
    let mut phone: &str = &stripped;

    if let Some(rest) = phone.strip_prefix('+') {
        phone = rest;
    }

    let mut candidate = match phone.strip_prefix(COUNTRY_CODE) {
        Some(rest) => format!("{TRUNK_PREFIX}{rest}"),
        None => phone.to_string(),
    };

    if BARE_SUBSCRIBER.is_match(&candidate) {
        candidate.insert(0, TRUNK_PREFIX);
    }

    if CANONICAL_MOBILE.is_match(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Reveal the first and last three characters only.
pub fn mask(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 6 {
        return "****".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}*****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_formats() {
        assert_eq!(normalize("0512345678").as_deref(), Some("0512345678"));
        assert_eq!(normalize("512345678").as_deref(), Some("0512345678"));
        assert_eq!(normalize("966512345678").as_deref(), Some("0512345678"));
        assert_eq!(normalize("+966512345678").as_deref(), Some("0512345678"));
        assert_eq!(normalize("05123456789").as_deref(), Some("05123456789"));
        assert_eq!(normalize("5123456789").as_deref(), Some("05123456789"));
    }

    #[test]
    fn test_separators_ignored() {
        assert_eq!(normalize(" +966 51 234 5678 ").as_deref(), Some("0512345678"));
        assert_eq!(normalize("(051) 234-5678").as_deref(), Some("0512345678"));
        assert_eq!(normalize("051.234.5678").as_deref(), Some("0512345678"));
    }

    #[test]
    fn test_rejected_inputs() {
        for raw in [
            "",
            "   ",
            "+",
            "0412345678",
            "051234567",
            "051234567890",
            "+14155551234",
            "abc",
            "05l2345678",
            "٠٥١٢٣٤٥٦٧٨",
            "++966512345678",
        ] {
            assert_eq!(normalize(raw), None, "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "0512345678",
            "512345678",
            "+966512345678",
            "966 5 1234 5678",
            "5123456789",
        ] {
            let once = normalize(raw).expect("valid input");
            assert_eq!(normalize(&once).as_deref(), Some(once.as_str()));
        }
    }

    #[test]
    fn test_same_principal_for_equivalent_inputs() {
        let a = PhoneNumber::parse("+966512345678").unwrap();
        let b = PhoneNumber::parse("0512345678").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mask() {
        let phone = PhoneNumber::parse("0512345678").unwrap();
        assert_eq!(phone.masked(), "051*****678");
        assert_eq!(mask("12345"), "****");
    }
}
