use super::ports::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered donor. Authentication lives elsewhere; the pipeline only
/// needs to know whether the account exists and is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl Entity for User {
    const COLLECTION: &'static str = "users";
    type Patch = UserPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    fn apply(&mut self, patch: &UserPatch) {
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
    }
}
