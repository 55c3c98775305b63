//! HS256 JSON Web Tokens via `jsonwebtoken`.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::{Claims, SessionError, TokenService};

/// A [`TokenService`] that signs claims as HS256 JWTs with a shared secret.
///
/// ```rust
/// use huddle_protocol::RoomId;
/// use huddle_session::{Claims, InviteClaims, JwtTokenService, TokenService};
///
/// let service = JwtTokenService::new(b"a-long-random-server-secret");
/// let claims = Claims::from(InviteClaims {
///     room_id: RoomId::new("a1b2c3d4e5f6"),
///     secret: "s3cr3t".into(),
///     exp: huddle_session::unix_now() + 60,
/// });
/// let token = service.issue(&claims).unwrap();
/// assert_eq!(service.verify_invite(&token).unwrap().secret, "s3cr3t");
/// ```
pub struct JwtTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtTokenService {
    /// Creates a service keyed by `secret`.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Room and token lifetimes are exact; no clock-skew allowance.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, claims: &Claims) -> Result<String, SessionError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| SessionError::Issue(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                match e.kind() {
                    ErrorKind::ExpiredSignature => SessionError::Expired,
                    ErrorKind::InvalidSignature => SessionError::SignatureMismatch,
                    _ => SessionError::Malformed(e.to_string()),
                }
            })
    }
}
