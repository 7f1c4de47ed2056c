//! Teacher model, mirrored from the remote account that opened the session.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    /// Remote user id
    pub external_id: i64,
    pub username: String,
    pub display_name: String,
    pub updated_at: String,
}
