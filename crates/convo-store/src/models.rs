//! Domain model structs persisted in the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use convo_shared::{Attachment, Message, ReplyPreview, UserId};

/// The single conversation between two identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    /// The two participants, lexicographically ordered.
    pub participants: (UserId, UserId),
    pub created_at: DateTime<Utc>,
}

/// Display profile used to decorate notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: String,
    pub profile_photo: String,
}
