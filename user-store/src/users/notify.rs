//! Outbound email

use std::future::Future;

use tracing::info;

use crate::error::Result;

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    /// Email carrying a verification code
    pub fn verification_code(
        to: &str,
        name: &str,
        company: &str,
        code: &str,
        valid_minutes: u64,
    ) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("{} | Email Verification OTP", company),
            body: format!(
                "Dear {name},\n\n\
                 Thank you for signing up with {company}! To verify your email address, \
                 please use the One-Time Password (OTP) provided below:\n\n\
                 Your OTP: {code}\n\n\
                 This OTP is valid for the next {valid_minutes} minutes. \
                 Please do not share this code with anyone.\n"
            ),
        }
    }

    /// Email carrying login credentials after verification
    pub fn credentials(to: &str, name: &str, company: &str, login_id: &str, password: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Welcome to {} - Your Login Credentials", company),
            body: format!(
                "Dear {name},\n\n\
                 Congratulations! Your account has been successfully created on {company}.\n\n\
                 Here are your login details:\n\n\
                 Login ID: {login_id}\n\
                 Password: {password}\n\n\
                 For security purposes, we recommend changing your password after your first login.\n"
            ),
        }
    }
}

/// Email delivery collaborator
pub trait Notifier: Clone + Send + Sync + 'static {
    /// Deliver one email
    fn send(&self, email: Email) -> impl Future<Output = Result<()>> + Send;
}

/// [`Notifier`] that only records deliveries in the log
///
/// Bodies are never logged since they may contain credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, email: Email) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "Email delivered to log");
        Ok(())
    }
}
