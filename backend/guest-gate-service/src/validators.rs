use once_cell::sync::Lazy;
use regex::Regex;

/// Input validation utilities for the OTP endpoints

// ASCII only: `\d` would accept Arabic-Indic digits the channel never sends.
static OTP_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{4,8}$").expect("hardcoded OTP code regex is invalid - fix source code")
});

static REQUEST_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-]{1,255}$")
        .expect("hardcoded request id regex is invalid - fix source code")
});

/// Submitted codes are 4 to 8 ASCII digits.
pub fn validate_otp_code(code: &str) -> bool {
    OTP_CODE_REGEX.is_match(code)
}

/// Delivery references are short opaque tokens without whitespace.
pub fn validate_request_id(request_id: &str) -> bool {
    REQUEST_ID_REGEX.is_match(request_id)
}
