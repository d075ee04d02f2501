//! User identity directory.
//!
//! The directory keeps a private record per user and only ever hands out the
//! public projection. Private fields (such as the network origin a guest was
//! minted from) stay inside [`UserSecret`] and never reach session storage or
//! API responses.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persistence::{StoreError, UserStore};

const ADJECTIVES: &[&str] = &[
    "Curious", "Patient", "Bright", "Quiet", "Swift", "Clever", "Gentle", "Bold", "Calm", "Keen",
];

const ANIMALS: &[&str] = &[
    "Otter", "Heron", "Lynx", "Badger", "Falcon", "Marten", "Puffin", "Gecko", "Ibis", "Wombat",
];

/// Client-safe view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub uuid: String,
    pub display_name: String,
    pub avatar_url: String,
}

/// Full private user record, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSecret {
    pub uuid: String,
    pub display_name: String,
    pub avatar_url: String,
    /// Address the identity was issued to.
    #[serde(default)]
    pub origin: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
}

impl UserSecret {
    #[must_use]
    pub fn public(&self) -> UserPublic {
        UserPublic {
            uuid: self.uuid.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Unknown user: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait UserDirectory: Send + Sync + std::fmt::Debug {
    /// Resolve a user's public projection.
    async fn resolve_public(&self, user_id: &str) -> Result<UserPublic, DirectoryError>;

    /// Mint and persist a guest identity, returning only its public form.
    async fn create_guest(&self, origin: Option<IpAddr>) -> Result<UserPublic, DirectoryError>;
}

/// Directory backed by a [`UserStore`].
#[derive(Debug, Clone)]
pub struct StoreDirectory {
    users: Arc<dyn UserStore>,
    avatar_url_template: String,
}

impl StoreDirectory {
    /// `avatar_url_template` may contain `{seed}`, replaced by the new user id.
    pub fn new(users: Arc<dyn UserStore>, avatar_url_template: impl Into<String>) -> Self {
        Self {
            users,
            avatar_url_template: avatar_url_template.into(),
        }
    }

    fn avatar_for(&self, seed: &str) -> String {
        self.avatar_url_template.replace("{seed}", seed)
    }
}

#[async_trait]
impl UserDirectory for StoreDirectory {
    async fn resolve_public(&self, user_id: &str) -> Result<UserPublic, DirectoryError> {
        self.users
            .get_user(user_id)
            .await?
            .map(|secret| secret.public())
            .ok_or_else(|| DirectoryError::NotFound(user_id.to_string()))
    }

    async fn create_guest(&self, origin: Option<IpAddr>) -> Result<UserPublic, DirectoryError> {
        let uuid = Uuid::new_v4().to_string();
        let secret = UserSecret {
            display_name: guest_name(),
            avatar_url: self.avatar_for(&uuid),
            uuid,
            origin,
            created_at: Utc::now(),
        };

        self.users.put_user(&secret).await?;

        tracing::info!(
            name: "directory.guest.created",
            user_id = %secret.uuid,
            display_name = %secret.display_name,
            "Guest identity issued"
        );

        Ok(secret.public())
    }
}

/// Generate a display name like "Curious Otter 4821".
fn guest_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Anonymous");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("Guest");
    let suffix: u16 = rng.gen_range(1000..10000);
    format!("{adjective} {animal} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::providers::memory::InMemoryStore;

    fn directory() -> (StoreDirectory, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let dir = StoreDirectory::new(
            Arc::clone(&store) as Arc<dyn UserStore>,
            "https://avatars.test/{seed}.svg",
        );
        (dir, store)
    }

    #[tokio::test]
    async fn test_guest_round_trips_through_directory() {
        let (dir, _) = directory();

        let guest = dir.create_guest(None).await.unwrap();
        assert!(!guest.display_name.is_empty());
        assert_eq!(
            guest.avatar_url,
            format!("https://avatars.test/{}.svg", guest.uuid)
        );

        let resolved = dir.resolve_public(&guest.uuid).await.unwrap();
        assert_eq!(resolved, guest);
    }

    #[tokio::test]
    async fn test_origin_stays_in_secret_record() {
        let (dir, store) = directory();
        let origin: IpAddr = "203.0.113.7".parse().unwrap();

        let guest = dir.create_guest(Some(origin)).await.unwrap();

        let secret = store.get_user(&guest.uuid).await.unwrap().unwrap();
        assert_eq!(secret.origin, Some(origin));

        let json = serde_json::to_value(&guest).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 3);
        assert!(json.get("origin").is_none());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (dir, _) = directory();
        let err = dir.resolve_public("ghost").await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_guest_name_shape() {
        let name = guest_name();
        let parts: Vec<&str> = name.split(' ').collect();
        assert_eq!(parts.len(), 3);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(ANIMALS.contains(&parts[1]));
        assert_eq!(parts[2].len(), 4);
    }
}
