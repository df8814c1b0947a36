use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use url::Url;

use crate::api::models::{Conversation, FriendProfile, NewConversation};
use crate::api::{check, ApiError};
use crate::backend::BackendConfig;

pub const CHATS: &str = "chats";
pub const USERS: &str = "users";

/// Document-store client speaking the Firestore REST dialect.
#[derive(Clone)]
pub struct FirestoreClient {
    http: HttpClient,
    documents: Url,
    api_key: String,
}

impl FirestoreClient {
    pub fn new(http: HttpClient, config: &BackendConfig) -> Result<Self, ApiError> {
        if !config.is_configured() {
            return Err(ApiError::NotConfigured);
        }
        let base = config.firestore_url.trim_end_matches('/');
        let documents = Url::parse(&format!(
            "{}/projects/{}/databases/(default)/documents",
            base, config.project_id
        ))?;
        Ok(Self { http, documents, api_key: config.api_key.clone() })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}{}", self.documents.as_str().trim_end_matches('/'), suffix)
    }

    fn with_auth(&self, mut req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        req = req.query(&[("key", self.api_key.as_str())]);
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        req
    }

    /// Run a structured query and return the matched documents.
    /// Result rows without a `document` (e.g. the trailing read-time row) are skipped.
    async fn run_query(&self, query: Value, token: Option<&str>) -> Result<Vec<Value>, ApiError> {
        let endpoint = self.endpoint(":runQuery");
        let req = self.with_auth(self.http.post(&endpoint), token).json(&query);
        let resp = check(req.send().await?).await?;
        let json: Value = resp.json().await?;
        let rows = json
            .as_array()
            .ok_or_else(|| ApiError::Decode("runQuery did not return an array".into()))?;
        Ok(rows.iter().filter_map(|row| row.get("document").cloned()).collect())
    }

    /// Every conversation whose `users` array contains `participant`.
    pub async fn conversations_with(&self, participant: &str, token: Option<&str>) -> Result<Vec<Conversation>, ApiError> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": CHATS }],
                "where": { "fieldFilter": {
                    "field": { "fieldPath": "users" },
                    "op": "ARRAY_CONTAINS",
                    "value": { "stringValue": participant }
                } }
            }
        });
        let docs = self.run_query(query, token).await?;
        Ok(docs.iter().filter_map(Conversation::from_document).collect())
    }

    pub async fn create_conversation(&self, new: &NewConversation, token: Option<&str>) -> Result<Conversation, ApiError> {
        let endpoint = self.endpoint(&format!("/{}", CHATS));
        let req = self.with_auth(self.http.post(&endpoint), token).json(&new.to_document());
        let resp = check(req.send().await?).await?;
        let json: Value = resp.json().await?;
        Conversation::from_document(&json)
            .ok_or_else(|| ApiError::Decode("created document has no name".into()))
    }

    /// Presence record for `email`, if that user ever signed in.
    pub async fn friend_profile(&self, email: &str, token: Option<&str>) -> Result<Option<FriendProfile>, ApiError> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": USERS }],
                "where": { "fieldFilter": {
                    "field": { "fieldPath": "email" },
                    "op": "EQUAL",
                    "value": { "stringValue": email }
                } },
                "limit": 1
            }
        });
        let docs = self.run_query(query, token).await?;
        Ok(docs.iter().find_map(FriendProfile::from_document))
    }

    /// Fetch raw bytes, used for avatar images.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let url = Url::parse(url)?;
        let resp = check(self.http.get(url).send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}
