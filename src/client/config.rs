use std::env;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Collection holding the conversation's message log.
    pub conversation_collection: String,
    /// Key prefix for uploaded avatars; the object key is `{prefix}/{user_id}`.
    pub avatar_prefix: String,
    /// Messages longer than this are rejected before synthesis.
    pub max_message_length: usize,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            conversation_collection: env::var("CHAT_COLLECTION")
                .unwrap_or_else(|_| "chats".to_string()),
            avatar_prefix: env::var("AVATAR_PREFIX").unwrap_or_else(|_| "avatars".to_string()),
            max_message_length: env::var("MAX_MESSAGE_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2048),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            conversation_collection: "chats".to_string(),
            avatar_prefix: "avatars".to_string(),
            max_message_length: 2048,
        }
    }
}
