//! JWT token utilities using HS256.
//!
//! Tokens are signed with HMAC-SHA256 keyed by a shared secret. Verification
//! only accepts the HMAC family, so a token declaring `none` or an asymmetric
//! algorithm is rejected before its payload is trusted.
//!
//! Time checks are not delegated to the decoder: [`parse_token`] verifies the
//! structure, algorithm and signature, while [`extract_claims`] and
//! [`is_authorized`] check `exp` and `nbf` against the clock explicitly.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use validator::Validate;

/// Authorization scheme expected in front of the token, compared case-insensitively.
pub const BEARER_SCHEME: &str = "bearer";

/// Default token lifetime in hours.
pub const DEFAULT_EXPIRY_HOURS: i64 = 24;

/// Claim names held by the named fields of [`Claims`].
pub const RESERVED_CLAIMS: [&str; 6] = ["email", "id", "iss", "exp", "iat", "nbf"];

/// Algorithms accepted when verifying a token.
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Error type for JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Invalid authorization header format")]
    InvalidAuthHeader,

    #[error("Token is invalid")]
    InvalidToken,

    #[error("Token is expired")]
    ExpiredToken,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid token lifetime: {0} hours")]
    InvalidLifetime(i64),

    #[error("Claim '{0}' is reserved")]
    ReservedClaim(String),

    /// Failure reported by the signing library, passed through unchanged.
    #[error(transparent)]
    Signing(jsonwebtoken::errors::Error),
}

/// Claims embedded in every issued token.
///
/// The named fields are always present on the wire. Anything else found in
/// the payload lands in `extra`, which is flattened back into the payload
/// when signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Email of the identity the token was issued to
    pub email: String,
    /// Subject identifier
    pub id: String,
    /// Issuer
    pub iss: String,
    /// Expiration time (Unix timestamp)
    #[serde(deserialize_with = "numeric_date")]
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(deserialize_with = "numeric_date")]
    pub iat: i64,
    /// Not before (Unix timestamp)
    #[serde(deserialize_with = "numeric_date")]
    pub nbf: i64,
    /// Additional claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Builds a claim set valid from `issued_at` until `expires_at`.
    pub fn new(
        email: &str,
        id: &str,
        issuer: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.to_string(),
            id: id.to_string(),
            iss: issuer.to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            extra: Map::new(),
        }
    }

    /// Adds an extension claim.
    ///
    /// Names in [`RESERVED_CLAIMS`] are ignored; set the named field instead.
    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        if RESERVED_CLAIMS.contains(&name) {
            debug!(claim = name, "ignoring extension claim with a reserved name");
            return self;
        }
        self.extra.insert(name.to_string(), value.into());
        self
    }

    /// Expiration as a timestamp, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Checks `exp` and `nbf` against `now` (Unix seconds).
    ///
    /// A token is expired once `exp` is strictly less than `now`.
    pub fn check_time_window(&self, now: i64) -> Result<(), JwtError> {
        if self.exp < now {
            return Err(JwtError::ExpiredToken);
        }
        if self.nbf > now {
            debug!(nbf = self.nbf, now, "token used before its not-before time");
            return Err(JwtError::InvalidToken);
        }
        Ok(())
    }
}

/// A freshly signed token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues an HS256 token for the given identity.
///
/// # Arguments
/// * `email` - Email of the identity
/// * `id` - Subject identifier
/// * `secret` - Shared signing secret, must not be empty
/// * `ttl_hours` - Token lifetime in hours; negative values mint an already expired token
/// * `issuer` - Value of the `iss` claim
pub fn create_token(
    email: &str,
    id: &str,
    secret: impl AsRef<[u8]>,
    ttl_hours: i64,
    issuer: &str,
) -> Result<IssuedToken, JwtError> {
    let now = Utc::now().trunc_subsecs(0);
    let expires_at = Duration::try_hours(ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or(JwtError::InvalidLifetime(ttl_hours))?;

    let claims = Claims::new(email, id, issuer, now, expires_at);
    let token = sign_claims(&claims, secret)?;

    Ok(IssuedToken { token, expires_at })
}

/// Signs a caller-built claim set with HS256.
///
/// Fails with [`JwtError::ReservedClaim`] when `extra` holds a name that a
/// named field already carries, since the payload would contain the key twice.
pub fn sign_claims(claims: &Claims, secret: impl AsRef<[u8]>) -> Result<String, JwtError> {
    let secret = non_empty_secret(secret.as_ref())?;
    if let Some(name) = RESERVED_CLAIMS
        .iter()
        .find(|name| claims.extra.contains_key(**name))
    {
        return Err(JwtError::ReservedClaim(name.to_string()));
    }
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(JwtError::Signing)
}

/// Extracts the token from an `Authorization` header value of the form `Bearer <token>`.
///
/// The header is split on its first space. The remainder is returned as is.
pub fn bearer_token(header: &str) -> Result<&str, JwtError> {
    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case(BEARER_SCHEME) => Ok(token),
        _ => Err(JwtError::InvalidAuthHeader),
    }
}

/// Verifies the token's structure, algorithm and signature.
///
/// Expiry and not-before are NOT checked here.
pub fn parse_token(token: &str, secret: impl AsRef<[u8]>) -> Result<TokenData<Claims>, JwtError> {
    let secret = non_empty_secret(secret.as_ref())?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = HMAC_ALGORITHMS.to_vec();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation).map_err(|e| {
        debug!(error = %e, "token rejected");
        JwtError::InvalidToken
    })
}

/// Verifies the token and returns an owned copy of its claims.
pub fn extract_claims(token: &str, secret: impl AsRef<[u8]>) -> Result<Claims, JwtError> {
    let data = parse_token(token, secret)?;
    data.claims.check_time_window(Utc::now().timestamp())?;
    Ok(data.claims)
}

/// Returns `Ok(true)` when the token verifies and is inside its validity window.
pub fn is_authorized(token: &str, secret: impl AsRef<[u8]>) -> Result<bool, JwtError> {
    let data = parse_token(token, secret)?;
    data.claims.check_time_window(Utc::now().timestamp())?;
    Ok(true)
}

/// Reads a NumericDate as whole seconds. Fractional values are floored.
fn numeric_date<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct NumericDateVisitor;

    impl de::Visitor<'_> for NumericDateVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a NumericDate in seconds")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom(format!("NumericDate out of range: {}", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            let seconds = v.floor();
            if !seconds.is_finite() || seconds < i64::MIN as f64 || seconds >= i64::MAX as f64 {
                return Err(E::custom(format!("NumericDate out of range: {}", v)));
            }
            Ok(seconds as i64)
        }
    }

    deserializer.deserialize_any(NumericDateVisitor)
}

fn non_empty_secret(secret: &[u8]) -> Result<&[u8], JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidKey("secret must not be empty".to_string()));
    }
    Ok(secret)
}

/// Token settings as read from configuration.
#[derive(Clone, Deserialize, Validate)]
pub struct JwtSettings {
    /// Shared HMAC secret
    #[validate(custom(function = "crate::validation::validate_secret_strength"))]
    pub secret: String,

    /// Value of the `iss` claim
    #[validate(custom(function = "crate::validation::validate_not_blank"))]
    pub issuer: String,

    /// Token lifetime in hours (default: 24)
    #[serde(default = "default_expiry_hours")]
    #[validate(range(min = 1, max = 8760, message = "Expiry must be between 1 and 8760 hours"))]
    pub expiry_hours: i64,
}

fn default_expiry_hours() -> i64 {
    DEFAULT_EXPIRY_HOURS
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("expiry_hours", &self.expiry_hours)
            .finish()
    }
}

/// Token service bound to one secret and issuer.
#[derive(Clone)]
pub struct JwtConfig {
    secret: String,
    /// Value of the `iss` claim
    pub issuer: String,
    /// Token lifetime in hours
    pub expiry_hours: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .field("expiry_hours", &self.expiry_hours)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl JwtConfig {
    /// Creates a new JwtConfig.
    ///
    /// # Arguments
    /// * `secret` - Shared HMAC secret, must not be empty
    /// * `issuer` - Value of the `iss` claim
    /// * `expiry_hours` - Token lifetime in hours
    pub fn new(secret: &str, issuer: &str, expiry_hours: i64) -> Result<Self, JwtError> {
        non_empty_secret(secret.as_bytes())?;
        Ok(Self {
            secret: secret.to_string(),
            issuer: issuer.to_string(),
            expiry_hours,
        })
    }

    /// Creates a JwtConfig from loaded settings.
    pub fn from_settings(settings: &JwtSettings) -> Result<Self, JwtError> {
        Self::new(&settings.secret, &settings.issuer, settings.expiry_hours)
    }

    /// Issues a token for the given identity.
    pub fn generate_token(&self, email: &str, id: &str) -> Result<IssuedToken, JwtError> {
        create_token(email, id, &self.secret, self.expiry_hours, &self.issuer)
    }

    /// Verifies a token signed with this secret. Expiry is not checked.
    pub fn parse_token(&self, token: &str) -> Result<TokenData<Claims>, JwtError> {
        parse_token(token, &self.secret)
    }

    /// Verifies a token and returns its claims if it is inside its validity window.
    pub fn extract_claims(&self, token: &str) -> Result<Claims, JwtError> {
        extract_claims(token, &self.secret)
    }

    /// Returns `Ok(true)` when the token verifies and has not expired.
    pub fn is_authorized(&self, token: &str) -> Result<bool, JwtError> {
        is_authorized(token, &self.secret)
    }

    /// Extracts the bearer token from a header value and returns its claims.
    pub fn authorize_header(&self, header: &str) -> Result<Claims, JwtError> {
        let token = bearer_token(header)?;
        self.extract_claims(token)
    }
}
