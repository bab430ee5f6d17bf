pub mod email;
pub mod error;
pub mod password;
pub mod service;
pub mod tokens;
pub mod username;
pub mod validation;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use email::{
    AppUrls, EmailComposer, EmailJob, EmailJobKind, EmailMessage, EmailQueue, EmailQueueConfig,
    EmailTemplates, LoginWarningKind, Mailer, SmtpConfig, SmtpMailer, TemplateConfig,
};
pub use error::{AuthError, Result};
pub use password::{HashParams, PasswordHasher};
pub use service::{AuthService, PasswordChange, SignInRequest};
pub use username::UsernameAvailability;
pub use validation::{EmailChange, SignUpRequest};
