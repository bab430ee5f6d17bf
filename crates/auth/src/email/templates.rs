use std::collections::HashMap;
use std::path::PathBuf;

/// The three kinds of outgoing mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailTemplateType {
    Verification,
    LoginWarning,
    PasswordReset,
}

impl EmailTemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::LoginWarning => "login_warning",
            Self::PasswordReset => "password_reset",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::Verification, Self::LoginWarning, Self::PasswordReset]
    }

    fn env_var(&self) -> &'static str {
        match self {
            Self::Verification => "VERIFICATION_TEMPLATE_PATH",
            Self::LoginWarning => "LOGIN_WARNING_TEMPLATE_PATH",
            Self::PasswordReset => "PASSWORD_RESET_TEMPLATE_PATH",
        }
    }

    fn builtin(&self) -> String {
        let content = match self {
            Self::Verification => VERIFICATION_HTML,
            Self::LoginWarning => LOGIN_WARNING_HTML,
            Self::PasswordReset => PASSWORD_RESET_HTML,
        };
        format!("<html><body>\n{}{}\n</body></html>", content, FOOTER)
    }
}

/// Links rendered into every email footer.
#[derive(Debug, Clone)]
pub struct AppUrls {
    pub security_url: String,
    pub support_url: String,
    pub privacy_url: String,
    pub terms_url: String,
}

impl Default for AppUrls {
    fn default() -> Self {
        Self {
            security_url: "http://localhost:3000/security".to_string(),
            support_url: "http://localhost:3000/support".to_string(),
            privacy_url: "http://localhost:3000/privacy".to_string(),
            terms_url: "http://localhost:3000/terms".to_string(),
        }
    }
}

impl AppUrls {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            security_url: std::env::var("SECURITY_URL").unwrap_or(defaults.security_url),
            support_url: std::env::var("SUPPORT_URL").unwrap_or(defaults.support_url),
            privacy_url: std::env::var("PRIVACY_URL").unwrap_or(defaults.privacy_url),
            terms_url: std::env::var("TERMS_URL").unwrap_or(defaults.terms_url),
        }
    }

    pub fn insert_into(&self, vars: &mut HashMap<String, String>) {
        vars.insert("security_url".into(), self.security_url.clone());
        vars.insert("support_url".into(), self.support_url.clone());
        vars.insert("privacy_url".into(), self.privacy_url.clone());
        vars.insert("terms_url".into(), self.terms_url.clone());
    }
}

/// Configured template file per kind.
#[derive(Debug, Clone, Default)]
pub struct TemplateConfig {
    pub paths: HashMap<EmailTemplateType, PathBuf>,
}

impl TemplateConfig {
    pub fn from_env() -> Self {
        let paths = EmailTemplateType::all()
            .iter()
            .filter_map(|kind| {
                std::env::var(kind.env_var())
                    .ok()
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| (*kind, PathBuf::from(p)))
            })
            .collect();
        Self { paths }
    }
}

/// HTML bodies, loaded once at startup.
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    bodies: HashMap<EmailTemplateType, String>,
}

impl Default for EmailTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EmailTemplates {
    pub fn builtin() -> Self {
        let bodies = EmailTemplateType::all()
            .iter()
            .map(|kind| (*kind, kind.builtin()))
            .collect();
        Self { bodies }
    }

    /// Read each configured file; unreadable or unset paths fall back to
    /// the built-in template.
    pub fn load(config: &TemplateConfig) -> Self {
        let mut templates = Self::builtin();
        for (kind, path) in &config.paths {
            match std::fs::read_to_string(path) {
                Ok(body) => {
                    templates.bodies.insert(*kind, body);
                }
                Err(e) => {
                    tracing::warn!(
                        template = kind.as_str(),
                        path = %path.display(),
                        error = %e,
                        "Failed to read email template, using built-in"
                    );
                }
            }
        }
        templates
    }

    pub fn render(&self, kind: EmailTemplateType, variables: &HashMap<String, String>) -> String {
        match self.bodies.get(&kind) {
            Some(body) => render_template(body, variables),
            None => render_template(&kind.builtin(), variables),
        }
    }
}

/// Simple {{variable}} substitution.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

const FOOTER: &str = r#"<p style="font-size:12px;color:#6b7280">Reference: {{ticket}} &middot;
<a href="{{support_url}}">Support</a> &middot; <a href="{{security_url}}">Security</a> &middot;
<a href="{{privacy_url}}">Privacy</a> &middot; <a href="{{terms_url}}">Terms</a></p>"#;

const VERIFICATION_HTML: &str = r#"<h2>Verify your email</h2>
<p>Hi {{username}},</p>
<p>Your verification code is <strong>{{code}}</strong>. It expires in 24 hours.</p>
"#;

const LOGIN_WARNING_HTML: &str = r#"<h2>{{headline}}</h2>
<p>Hi {{username}},</p>
<p>{{message}}</p>
<ul><li>Device: {{device}}</li><li>IP address: {{ip_address}}</li><li>Time: {{time}}</li></ul>
<p>If this wasn't you, review your account at <a href="{{security_url}}">{{security_url}}</a>.</p>
"#;

const PASSWORD_RESET_HTML: &str = r#"<h2>Reset your password</h2>
<p>Hi {{username}},</p>
<p><a href="{{reset_url}}">Choose a new password</a>. The link expires at {{expires_at}}.</p>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        let mut vars = HashMap::new();
        vars.insert("username".to_string(), "jane".to_string());
        vars.insert("code".to_string(), "12345678".to_string());
        assert_eq!(
            render_template("Hi {{username}}, code {{code}} {{missing}}", &vars),
            "Hi jane, code 12345678 {{missing}}"
        );
    }

    #[test]
    fn test_builtin_templates_carry_footer() {
        let templates = EmailTemplates::builtin();
        let mut vars = HashMap::new();
        vars.insert("ticket".to_string(), "CNF-1-100".to_string());
        for kind in EmailTemplateType::all() {
            let body = templates.render(*kind, &vars);
            assert!(body.contains("Reference: CNF-1-100"), "{}", kind.as_str());
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let mut config = TemplateConfig::default();
        config.paths.insert(
            EmailTemplateType::PasswordReset,
            PathBuf::from("/nonexistent/reset.html"),
        );
        let templates = EmailTemplates::load(&config);

        let mut vars = HashMap::new();
        vars.insert("reset_url".to_string(), "https://x/reset?token=t".to_string());
        let body = templates.render(EmailTemplateType::PasswordReset, &vars);
        assert!(body.contains("https://x/reset?token=t"));
    }
}
