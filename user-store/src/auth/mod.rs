//! Credentials: one-time codes, generated passwords and session tokens
//!
//! # Features
//!
//! - `jwt` - HMAC-signed session tokens via [`JwtIssuer`]

pub mod otp;

#[cfg(feature = "jwt")]
pub mod jwt;

pub use otp::{generate_otp, generate_password};

#[cfg(feature = "jwt")]
pub use jwt::{Claims, IssuedToken, JwtIssuer};
