use crate::error::{GateError, Result};
use crate::phone::PhoneNumber;
use crypto_core::jwt::{JwtSigner, TokenPair, TokenType};
use tracing::{debug, info};

/// Mints and checks guest credentials.
///
/// The token itself is the only proof of a verified phone; nothing is looked
/// up when a token is refreshed or presented.
#[derive(Clone, Debug)]
pub struct SessionIssuer {
    signer: JwtSigner,
}

impl SessionIssuer {
    pub fn new(signer: JwtSigner) -> Self {
        Self { signer }
    }

    pub fn issue(&self, phone: &PhoneNumber) -> Result<TokenPair> {
        let pair = self.signer.issue_pair(phone.as_str())?;
        info!(phone = %phone.masked(), "Issued guest session");
        Ok(pair)
    }

    /// Exchange a refresh token for a fresh access token and a rotated refresh token.
    ///
    /// Rotation is stateless: the presented refresh token stays usable until it expires.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let phone = self.subject_of(refresh_token, TokenType::Refresh)?;
        let pair = self.signer.issue_pair(phone.as_str())?;
        debug!(phone = %phone.masked(), "Rotated guest session");
        Ok(pair)
    }

    /// Phone behind a valid access token.
    pub fn authenticate(&self, access_token: &str) -> Result<PhoneNumber> {
        self.subject_of(access_token, TokenType::Access)
    }

    fn subject_of(&self, token: &str, expected: TokenType) -> Result<PhoneNumber> {
        let claims = self.signer.validate(token, expected)?;
        // Subjects are always written canonical; anything else was not minted here.
        PhoneNumber::parse(&claims.sub)
            .filter(|phone| phone.as_str() == claims.sub)
            .ok_or(GateError::InvalidCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::jwt::TokenLifetimes;

    fn issuer() -> SessionIssuer {
        SessionIssuer::new(
            JwtSigner::hs256(b"session-test-secret", "guest-gate", TokenLifetimes::default())
                .unwrap(),
        )
    }

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("0512345678").unwrap()
    }

    #[test]
    fn test_issue_binds_phone() {
        let sessions = issuer();
        let pair = sessions.issue(&phone()).unwrap();
        assert_eq!(sessions.authenticate(&pair.access_token).unwrap(), phone());
    }

    #[test]
    fn test_refresh_rotates_both_tokens() {
        let sessions = issuer();
        let pair = sessions.issue(&phone()).unwrap();
        let rotated = sessions.refresh(&pair.refresh_token).unwrap();

        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert_ne!(rotated.access_token, pair.access_token);
        assert_eq!(sessions.authenticate(&rotated.access_token).unwrap(), phone());
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let sessions = issuer();
        let pair = sessions.issue(&phone()).unwrap();

        assert!(matches!(
            sessions.refresh(&pair.access_token),
            Err(GateError::InvalidCredential)
        ));
        assert!(matches!(
            sessions.authenticate(&pair.refresh_token),
            Err(GateError::InvalidCredential)
        ));
    }

    #[test]
    fn test_refresh_rejects_garbage_and_foreign_tokens() {
        let sessions = issuer();
        assert!(matches!(
            sessions.refresh("not-a-token"),
            Err(GateError::InvalidCredential)
        ));

        let foreign = JwtSigner::hs256(b"another-secret", "guest-gate", TokenLifetimes::default())
            .unwrap()
            .issue("0512345678", TokenType::Refresh)
            .unwrap();
        assert!(matches!(
            sessions.refresh(&foreign),
            Err(GateError::InvalidCredential)
        ));
    }

    #[test]
    fn test_non_phone_subject_rejected() {
        let signer =
            JwtSigner::hs256(b"session-test-secret", "guest-gate", TokenLifetimes::default())
                .unwrap();
        let token = signer.issue("admin", TokenType::Refresh).unwrap();
        assert!(matches!(
            SessionIssuer::new(signer).refresh(&token),
            Err(GateError::InvalidCredential)
        ));
    }
}
