//! Token signing and message authentication shared by the gate services.

pub mod jwt;
pub mod signature;

pub use jwt::{Claims, JwtError, JwtSigner, TokenLifetimes, TokenPair, TokenType};
