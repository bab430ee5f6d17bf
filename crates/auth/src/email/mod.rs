pub mod jobs;
pub mod queue;
pub mod service;
pub mod templates;

pub use jobs::{EmailComposer, EmailJob, EmailJobKind, LoginWarningKind};
pub use queue::{EmailQueue, EmailQueueConfig};
pub use service::{EmailMessage, Mailer, SmtpConfig, SmtpMailer};
pub use templates::{AppUrls, EmailTemplateType, EmailTemplates, TemplateConfig};
