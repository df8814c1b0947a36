use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl Conversation {
    pub fn has_participant(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p == id)
    }

    pub fn is_group(&self) -> bool {
        self.name.is_some() || self.participants.len() > 2
    }

    /// First participant that is not `me`.
    pub fn counterpart(&self, me: &str) -> Option<&str> {
        self.participants.iter().map(String::as_str).find(|p| *p != me)
    }

    pub fn others(&self, me: &str) -> Vec<String> {
        self.participants.iter().filter(|p| *p != me).cloned().collect()
    }

    /// Label used by the conversation list.
    pub fn title(&self, me: &str) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let others = self.others(me);
        if others.is_empty() { me.to_string() } else { others.join(", ") }
    }

    /// Decode a Firestore document from the `chats` collection.
    /// The key is the last segment of the document's resource name.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let id = doc.get("name")?.as_str()?.rsplit('/').next()?.to_string();
        if id.is_empty() {
            return None;
        }
        let fields = doc.get("fields")?;
        let participants = string_array_field(fields, "users");
        Some(Self {
            id,
            participants,
            name: string_field(fields, "groupName"),
            photo_url: string_field(fields, "groupPhoto"),
        })
    }
}

/// Payload for a conversation the store has not assigned a key to yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub participants: Vec<String>,
    pub name: Option<String>,
}

impl NewConversation {
    /// Participants are deduplicated, keeping the first occurrence order.
    pub fn new<I, S>(participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for p in participants {
            let p = p.into();
            if !out.contains(&p) {
                out.push(p);
            }
        }
        Self { participants: out, name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn to_document(&self) -> Value {
        let values: Vec<Value> = self
            .participants
            .iter()
            .map(|p| json!({ "stringValue": p }))
            .collect();
        let mut fields = json!({
            "users": { "arrayValue": { "values": values } }
        });
        if let Some(name) = &self.name {
            fields["groupName"] = json!({ "stringValue": name });
        }
        json!({ "fields": fields })
    }
}

/// Presence data shown in the direct-chat header.
#[derive(Debug, Clone, PartialEq)]
pub struct FriendProfile {
    pub email: String,
    pub photo_url: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl FriendProfile {
    /// Decode a Firestore document from the `users` collection.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let fields = doc.get("fields")?;
        Some(Self {
            email: string_field(fields, "email")?,
            photo_url: string_field(fields, "photoURL"),
            last_seen: timestamp_field(fields, "lastSeen"),
        })
    }
}

fn string_field(fields: &Value, key: &str) -> Option<String> {
    fields
        .get(key)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn string_array_field(fields: &Value, key: &str) -> Vec<String> {
    fields
        .get(key)
        .and_then(|v| v.get("arrayValue"))
        .and_then(|v| v.get("values"))
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.get("stringValue").and_then(|s| s.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn timestamp_field(fields: &Value, key: &str) -> Option<DateTime<Utc>> {
    let raw = fields.get(key)?.get("timestampValue")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_chat_document() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/chats/abc123",
            "fields": {
                "users": { "arrayValue": { "values": [
                    { "stringValue": "me@x.com" },
                    { "stringValue": "a@b.com" }
                ] } }
            }
        });
        let conv = Conversation::from_document(&doc).unwrap();
        assert_eq!(conv.id, "abc123");
        assert_eq!(conv.participants, vec!["me@x.com", "a@b.com"]);
        assert!(!conv.is_group());
        assert_eq!(conv.counterpart("me@x.com"), Some("a@b.com"));
        assert_eq!(conv.title("me@x.com"), "a@b.com");
    }

    #[test]
    fn chat_document_without_users_has_no_participants() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/chats/empty",
            "fields": {}
        });
        let conv = Conversation::from_document(&doc).unwrap();
        assert!(conv.participants.is_empty());
        assert!(Conversation::from_document(&json!({ "fields": {} })).is_none());
    }

    #[test]
    fn group_name_wins_title() {
        let conv = Conversation {
            id: "g".into(),
            participants: vec!["me@x.com".into(), "a@b.com".into()],
            name: Some("Climbing".into()),
            photo_url: None,
        };
        assert!(conv.is_group());
        assert_eq!(conv.title("me@x.com"), "Climbing");
    }

    #[test]
    fn new_conversation_dedups_participants() {
        let new = NewConversation::new(["me@x.com", "a@b.com", "me@x.com"]);
        assert_eq!(new.participants, vec!["me@x.com", "a@b.com"]);
        let doc = new.with_name("Pals").to_document();
        assert_eq!(doc["fields"]["users"]["arrayValue"]["values"][1]["stringValue"], "a@b.com");
        assert_eq!(doc["fields"]["groupName"]["stringValue"], "Pals");
    }

    #[test]
    fn decodes_friend_profile() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/users/u1",
            "fields": {
                "email": { "stringValue": "a@b.com" },
                "photoURL": { "stringValue": "https://img/a.png" },
                "lastSeen": { "timestampValue": "2024-03-01T10:00:00Z" }
            }
        });
        let profile = FriendProfile::from_document(&doc).unwrap();
        assert_eq!(profile.email, "a@b.com");
        assert_eq!(profile.photo_url.as_deref(), Some("https://img/a.png"));
        assert_eq!(profile.last_seen.unwrap().to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }
}
