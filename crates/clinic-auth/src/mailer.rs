//! Outbound mail collaborator.

use async_trait::async_trait;
use clinic_core::error::ClinicResult;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn welcome(to: &str, tenant_name: &str, password: Option<&str>) -> Self {
        let body = match password {
            Some(password) => format!(
                "You have been added to {tenant_name}.\n\n\
                 Sign in with {to} and the temporary password {password}, \
                 then change it from your profile."
            ),
            None => format!(
                "You have been added to {tenant_name}. \
                 Sign in with your existing credentials."
            ),
        };
        Self {
            to: to.to_string(),
            subject: format!("Welcome to {tenant_name}"),
            body,
        }
    }

    pub fn password_reset(to: &str, token: &str, lifetime_minutes: u64) -> Self {
        Self {
            to: to.to_string(),
            subject: "Password reset".into(),
            body: format!(
                "Use this code to choose a new password: {token}\n\n\
                 It expires in {lifetime_minutes} minutes and works once."
            ),
        }
    }
}

/// Delivers mail. Failures map to `ClinicError::Dependency`.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> ClinicResult<()>;
}

/// Writes a delivery line to the log instead of sending. Bodies are
/// never logged since they carry credentials.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> ClinicResult<()> {
        info!(to = %message.to, subject = %message.subject, "Mail delivered to log");
        Ok(())
    }
}
