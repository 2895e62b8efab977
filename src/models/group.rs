//! Group roster models (read-only dependency owned by the group directory).

use serde::{Deserialize, Serialize};

/// Group record (document ID: group id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub created_by: String,
}

/// Group membership record (document ID: `{group_id}_{user_id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    /// "owner" or "member"
    pub role: String,
}
