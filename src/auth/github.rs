use super::{Authenticate, SessionHandle};
use crate::error::{ExportError, Result};
use crate::fetch::{HttpSettings, Session};
use serde_json::Value;
use tracing::info;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Personal access token for the GitHub REST API.
pub struct GitHubToken {
    token: Option<String>,
    api_base: String,
}

impl GitHubToken {
    pub fn new(token: Option<String>, api_base: &str) -> Self {
        Self {
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

impl Authenticate for GitHubToken {
    /// Verifies the token against `GET /user` and reports its login.
    fn authenticate(&self, http: &HttpSettings) -> Result<SessionHandle> {
        let token = self
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ExportError::Auth("no GitHub token given (use --token or GITHUB_TOKEN)".to_string())
            })?;

        let session = Session::new(http, format!("token {token}"))?.with_accept(GITHUB_ACCEPT);

        let user = session.get(&format!("{}/user", self.api_base), &[])?;
        let login = user
            .body
            .get("login")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(login) = &login {
            info!("Authenticated to GitHub as {}", login);
        }

        Ok(SessionHandle {
            session,
            account: login,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_token_is_an_auth_error() {
        let http = HttpSettings::default();
        for token in [None, Some("   ".to_string())] {
            let result = GitHubToken::new(token, "http://127.0.0.1:9").authenticate(&http);
            assert!(matches!(result, Err(ExportError::Auth(_))));
        }
    }
}
