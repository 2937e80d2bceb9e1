//! JWT issuance and validation (requires `jwt` feature)
//!
//! Tokens carry the authenticated user's details under a `user_details`
//! claim next to the registered `exp`, `iat` and optional `iss` claims.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::error::{Error, Result};

/// Claims of an issued token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims<T> {
    /// Public details of the authenticated user
    pub user_details: T,
    /// Expiry (seconds since the epoch)
    pub exp: i64,
    /// Issued at (seconds since the epoch)
    pub iat: i64,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// A signed token and when it stops being valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Encoded JWT
    pub token: String,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
}

/// HMAC-signed JWT issuer and validator
#[derive(Clone)]
pub struct JwtIssuer {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    algorithm: Algorithm,
    validation: Validation,
    lifetime: Duration,
    issuer: Option<String>,
}

impl std::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIssuer")
            .field("algorithm", &self.algorithm)
            .field("lifetime", &self.lifetime)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtIssuer {
    /// Create an issuer from configuration
    ///
    /// Fails when the secret is empty, the algorithm is not an HMAC one or
    /// the lifetime is out of range.
    pub fn new(config: &JwtConfig) -> Result<Self> {
        if config.secret.is_empty() {
            return Err(Error::Config(Box::new(figment::Error::from(
                "JWT secret must not be empty".to_string(),
            ))));
        }
        let lifetime = i64::try_from(config.expiry_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or_else(|| {
                Error::Config(Box::new(figment::Error::from(format!(
                    "JWT expiry of {} minutes is out of range",
                    config.expiry_minutes
                ))))
            })?;

        let algorithm = parse_algorithm(&config.algorithm)?;
        let secret = config.secret.as_bytes();

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret)),
            decoding_key: Arc::new(DecodingKey::from_secret(secret)),
            algorithm,
            validation,
            lifetime,
            issuer: config.issuer.clone(),
        })
    }

    /// Token lifetime
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign a token carrying `user_details`
    pub fn issue<T: Serialize>(&self, user_details: &T) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| Error::Internal("token expiry is out of range".into()))?;

        let claims = Claims {
            user_details,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Decode a token, checking signature, expiry and issuer
    pub fn validate<T: DeserializeOwned>(&self, token: &str) -> Result<Claims<T>> {
        decode::<Claims<T>>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| Error::Unauthorized(format!("Invalid token: {}", e)))
    }
}

fn parse_algorithm(alg: &str) -> Result<Algorithm> {
    match alg.to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(Error::Config(Box::new(figment::Error::from(format!(
            "Unsupported JWT algorithm: {}",
            alg
        ))))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Details {
        email: String,
    }

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".into(),
            issuer: Some("user-store".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_issue_then_validate() {
        let issuer = JwtIssuer::new(&config()).unwrap();
        let details = Details {
            email: "jane@example.com".into(),
        };

        let issued = issuer.issue(&details).unwrap();
        assert!(issued.expires_at > Utc::now());

        let claims: Claims<Details> = issuer.validate(&issued.token).unwrap();
        assert_eq!(claims.user_details, details);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
        assert_eq!(claims.iss.as_deref(), Some("user-store"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = JwtIssuer::new(&JwtConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_oversized_lifetime_rejected() {
        let result = JwtIssuer::new(&JwtConfig {
            expiry_minutes: u64::MAX,
            ..config()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_far_future_expiry_is_an_error() {
        let issuer = JwtIssuer::new(&JwtConfig {
            expiry_minutes: i64::MAX as u64 / 60_000,
            ..config()
        })
        .unwrap();
        let result = issuer.issue(&Details {
            email: "a@b.co".into(),
        });
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn test_asymmetric_algorithm_rejected() {
        let result = JwtIssuer::new(&JwtConfig {
            algorithm: "RS256".into(),
            ..config()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = JwtIssuer::new(&config())
            .unwrap()
            .issue(&Details { email: "a@b.co".into() })
            .unwrap()
            .token;
        let other = JwtIssuer::new(&JwtConfig {
            secret: "other".into(),
            ..config()
        })
        .unwrap();

        assert!(matches!(
            other.validate::<Details>(&token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let issuer = JwtIssuer::new(&config()).unwrap();
        let claims = Claims {
            user_details: Details { email: "a@b.co".into() },
            exp: Utc::now().timestamp() - 60,
            iat: Utc::now().timestamp() - 120,
            iss: Some("user-store".into()),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &issuer.encoding_key).unwrap();

        assert!(matches!(
            issuer.validate::<Details>(&token),
            Err(Error::Unauthorized(_))
        ));
    }
}
