// Common models shared between the client core and the remote backends
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity fields of a signed-in user as delivered by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Current authentication identity. Exactly one value exists per
/// `SessionManager`; it is replaced wholesale on every identity event and
/// never mutated field-by-field from consumer code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    /// Initial state, before the first identity callback has arrived.
    #[default]
    Unknown,
    SignedOut,
    SignedIn(UserProfile),
}

impl Session {
    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Session::SignedIn(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, Session::SignedIn(_))
    }
}

/// Sender identity embedded in every chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl From<&UserProfile> for Sender {
    fn from(profile: &UserProfile) -> Self {
        Sender {
            id: profile.user_id.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

/// One chat entry. `id` is unique within the conversation; once a message
/// with a given id has been observed in a remote snapshot, any pending local
/// copy sharing that id is superseded by the remote one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub sender: Sender,
}

/// Mutable subset of the profile record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_wire_field_names() {
        let message = Message {
            id: "m1".into(),
            created_at: Utc::now(),
            text: "ciao".into(),
            sender: Sender {
                id: "u1".into(),
                display_name: Some("Luigi".into()),
                avatar_url: None,
            },
        };
        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value["sender"].get("displayName").is_some());
        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn session_profile_accessor() {
        assert!(Session::Unknown.profile().is_none());
        assert!(Session::SignedOut.profile().is_none());
        let session = Session::SignedIn(UserProfile {
            user_id: "u1".into(),
            display_name: None,
            avatar_url: None,
        });
        assert_eq!(session.profile().unwrap().user_id, "u1");
        assert!(session.is_signed_in());
    }
}
