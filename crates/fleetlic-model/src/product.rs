use serde::{Deserialize, Serialize};

/// Product identity used to key simulation results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductData {
    pub name: String,
    #[serde(default)]
    pub tag: String,
}

impl ProductData {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }
}

/// A named-user record found under a pooling anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub user_id: String,
    pub user_count: i64,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, user_count: i64) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            user_count,
        }
    }
}
