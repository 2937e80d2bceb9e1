//! One-time codes and generated passwords
//!
//! Both draw from the thread-local CSPRNG.

use rand::Rng;

const PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()-_=+[]{}<>?/";

/// Numeric one-time code of `length` digits
///
/// Leading zeros are kept, so the code is always exactly `length` characters.
pub fn generate_otp(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Random password of `length` characters over letters, digits and symbols
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(PASSWORD_CHARSET[rng.random_range(0..PASSWORD_CHARSET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_is_digits_of_requested_length() {
        for length in [4, 6, 8] {
            let otp = generate_otp(length);
            assert_eq!(otp.len(), length);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(generate_otp(0), "");
    }

    #[test]
    fn test_password_uses_charset() {
        let password = generate_password(64);
        assert_eq!(password.chars().count(), 64);
        assert!(password.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
    }

    #[test]
    fn test_passwords_differ() {
        assert_ne!(generate_password(24), generate_password(24));
    }
}
