use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::api::{check, ApiError};
use crate::app::Session;
use crate::backend::BackendConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    email: String,
    id_token: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

/// Identity client speaking the Identity Toolkit REST dialect.
#[derive(Clone)]
pub struct AuthClient {
    http: HttpClient,
    base: Url,
    api_key: String,
}

impl AuthClient {
    pub fn new(http: HttpClient, config: &BackendConfig) -> Result<Self, ApiError> {
        if !config.is_configured() {
            return Err(ApiError::NotConfigured);
        }
        let base = Url::parse(&format!("{}/", config.auth_url.trim_end_matches('/')))?;
        Ok(Self { http, base, api_key: config.api_key.clone() })
    }

    fn endpoint(&self, method: &str) -> Result<Url, ApiError> {
        // "./" keeps `accounts:` from being read as a URL scheme.
        let mut url = self.base.join(&format!("./accounts:{}", method))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    /// Password sign-in. The profile lookup that follows is best effort:
    /// a session without a display name or photo is still usable.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let resp = check(self.http.post(self.endpoint("signInWithPassword")?).json(&body).send().await?).await?;
        let signed: SignInResponse = resp.json().await?;

        let mut session = Session {
            email: signed.email,
            display_name: signed.display_name.filter(|n| !n.is_empty()).unwrap_or_default(),
            photo_url: signed.profile_picture,
            id_token: Some(signed.id_token),
        };
        match self.lookup(session.id_token.as_deref().unwrap_or_default()).await {
            Ok(Some(user)) => {
                if let Some(name) = user.display_name.filter(|n| !n.is_empty()) {
                    session.display_name = name;
                }
                if user.photo_url.is_some() {
                    session.photo_url = user.photo_url;
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Profile lookup for {} failed: {}", session.email, e),
        }
        if session.display_name.is_empty() {
            session.display_name = session.email.clone();
        }
        Ok(session)
    }

    async fn lookup(&self, id_token: &str) -> Result<Option<LookupUser>, ApiError> {
        let body = json!({ "idToken": id_token });
        let resp = check(self.http.post(self.endpoint("lookup")?).json(&body).send().await?).await?;
        let lookup: LookupResponse = resp.json().await?;
        Ok(lookup.users.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_api_key() {
        let config = BackendConfig {
            api_key: "secret".into(),
            project_id: "demo".into(),
            ..BackendConfig::default()
        };
        let client = AuthClient::new(HttpClient::new(), &config).unwrap();
        let url = client.endpoint("signInWithPassword").unwrap();
        assert_eq!(
            url.as_str(),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword?key=secret"
        );
    }

    #[test]
    fn sign_in_response_tolerates_missing_profile() {
        let raw = r#"{"localId":"u1","email":"me@x.com","idToken":"t","registered":true}"#;
        let parsed: SignInResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.email, "me@x.com");
        assert!(parsed.display_name.is_none());
        assert!(parsed.profile_picture.is_none());
    }
}
