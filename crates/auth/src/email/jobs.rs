use super::service::EmailMessage;
use super::templates::{AppUrls, EmailTemplateType, EmailTemplates};
use crate::tokens::ticket_reference;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Which security notice a login warning carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginWarningKind {
    NewLogin,
    LockoutFailedAttempts,
    AccountLocked,
    Default,
}

impl LoginWarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewLogin => "new_login",
            Self::LockoutFailedAttempts => "lockout_failed_attempts",
            Self::AccountLocked => "account_locked",
            Self::Default => "default",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::NewLogin => "New sign-in to your account",
            Self::LockoutFailedAttempts => {
                "Your account has been locked after failed sign-in attempts"
            }
            Self::AccountLocked => "Sign-in attempt on a locked account",
            Self::Default => "Security alert for your account",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::NewLogin => "We noticed a new sign-in to your account.",
            Self::LockoutFailedAttempts => {
                "Your account was locked after too many failed sign-in attempts."
            }
            Self::AccountLocked => "Someone tried to sign in while your account is locked.",
            Self::Default => "We noticed unusual activity on your account.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmailJobKind {
    Verification {
        code: String,
    },
    LoginWarning {
        warning: LoginWarningKind,
        device: String,
        ip_address: String,
        time: DateTime<Utc>,
    },
    PasswordReset {
        token: String,
        expires_at: DateTime<Utc>,
    },
}

/// One unit of work for the email workers.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailJob {
    pub recipient: String,
    pub username: String,
    pub kind: EmailJobKind,
    pub submitted_at: DateTime<Utc>,
}

impl EmailJob {
    pub fn verification(recipient: &str, username: &str, code: &str) -> Self {
        Self::new(
            recipient,
            username,
            EmailJobKind::Verification {
                code: code.to_string(),
            },
        )
    }

    pub fn login_warning(
        recipient: &str,
        username: &str,
        warning: LoginWarningKind,
        device: &str,
        ip_address: &str,
    ) -> Self {
        Self::new(
            recipient,
            username,
            EmailJobKind::LoginWarning {
                warning,
                device: device.to_string(),
                ip_address: ip_address.to_string(),
                time: Utc::now(),
            },
        )
    }

    pub fn password_reset(
        recipient: &str,
        username: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            recipient,
            username,
            EmailJobKind::PasswordReset {
                token: token.to_string(),
                expires_at,
            },
        )
    }

    fn new(recipient: &str, username: &str, kind: EmailJobKind) -> Self {
        Self {
            recipient: recipient.to_string(),
            username: username.to_string(),
            kind,
            submitted_at: Utc::now(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            EmailJobKind::Verification { .. } => "verification",
            EmailJobKind::LoginWarning { .. } => "login_warning",
            EmailJobKind::PasswordReset { .. } => "password_reset",
        }
    }
}

/// Turns jobs into rendered messages.
#[derive(Debug, Clone, Default)]
pub struct EmailComposer {
    templates: EmailTemplates,
    urls: AppUrls,
}

impl EmailComposer {
    pub fn new(templates: EmailTemplates, urls: AppUrls) -> Self {
        Self { templates, urls }
    }

    /// Password reset link built from the security URL.
    pub fn reset_url(&self, token: &str) -> String {
        format!(
            "{}/reset-password?token={}",
            self.urls.security_url.trim_end_matches('/'),
            token
        )
    }

    pub fn compose(&self, job: &EmailJob) -> EmailMessage {
        let mut vars = HashMap::new();
        self.urls.insert_into(&mut vars);
        vars.insert("username".to_string(), job.username.clone());

        let (template, subject) = match &job.kind {
            EmailJobKind::Verification { code } => {
                vars.insert("code".to_string(), code.clone());
                vars.insert("ticket".to_string(), ticket_reference("CNF"));
                (
                    EmailTemplateType::Verification,
                    "Verify your email address".to_string(),
                )
            }
            EmailJobKind::LoginWarning {
                warning,
                device,
                ip_address,
                time,
            } => {
                vars.insert("headline".to_string(), warning.subject().to_string());
                vars.insert("message".to_string(), warning.message().to_string());
                vars.insert("device".to_string(), device.clone());
                vars.insert("ip_address".to_string(), ip_address.clone());
                vars.insert("time".to_string(), time.format(TIME_FORMAT).to_string());
                vars.insert("ticket".to_string(), ticket_reference("ALRT"));
                (EmailTemplateType::LoginWarning, warning.subject().to_string())
            }
            EmailJobKind::PasswordReset { token, expires_at } => {
                vars.insert("reset_url".to_string(), self.reset_url(token));
                vars.insert(
                    "expires_at".to_string(),
                    expires_at.format(TIME_FORMAT).to_string(),
                );
                vars.insert("ticket".to_string(), ticket_reference("RST"));
                (EmailTemplateType::PasswordReset, "Reset your password".to_string())
            }
        };

        EmailMessage {
            to: job.recipient.clone(),
            subject,
            html_body: self.templates.render(template, &vars),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_verification() {
        let composer = EmailComposer::default();
        let message = composer.compose(&EmailJob::verification("a@example.com", "alice", "01234567"));

        assert_eq!(message.to, "a@example.com");
        assert!(message.html_body.contains("01234567"));
        assert!(message.html_body.contains("alice"));
        assert!(message.html_body.contains("CNF-"));
        assert!(!message.html_body.contains("{{"));
    }

    #[test]
    fn test_compose_login_warning_uses_kind_subject() {
        let composer = EmailComposer::default();
        let job = EmailJob::login_warning(
            "a@example.com",
            "alice",
            LoginWarningKind::LockoutFailedAttempts,
            "desktop",
            "203.0.113.9",
        );
        let message = composer.compose(&job);

        assert_eq!(message.subject, LoginWarningKind::LockoutFailedAttempts.subject());
        assert!(message.html_body.contains("203.0.113.9"));
        assert!(message.html_body.contains("ALRT-"));
    }

    #[test]
    fn test_reset_url() {
        let urls = AppUrls {
            security_url: "https://tickets.example.com/security/".to_string(),
            ..AppUrls::default()
        };
        let composer = EmailComposer::new(EmailTemplates::builtin(), urls);
        assert_eq!(
            composer.reset_url("tok"),
            "https://tickets.example.com/security/reset-password?token=tok"
        );
    }
}
