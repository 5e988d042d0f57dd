//! Credential providers.
//!
//! Each provider turns its configuration into an authenticated [`Session`],
//! so the fetchers never see how the credential was obtained.

pub mod github;
pub mod google;

use crate::error::Result;
use crate::fetch::{HttpSettings, Session};

pub use github::GitHubToken;
pub use google::GoogleOAuth;

pub struct SessionHandle {
    pub session: Session,
    /// Account the credential belongs to, when the provider can tell.
    pub account: Option<String>,
}

pub trait Authenticate {
    fn authenticate(&self, http: &HttpSettings) -> Result<SessionHandle>;
}
