//! Async, cloneable handle over a single [`Database`].
//!
//! Every method hops onto the blocking pool and takes the connection lock
//! for the duration of one logical operation, so each call is a suspension
//! point for the caller but atomic with respect to other store calls.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Conversation, Message, UserId, UserProfile};

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().map_err(|_| StoreError::Poisoned)?;
            op(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    // -- conversations --

    pub async fn resolve_conversation(&self, a: &UserId, b: &UserId) -> Result<Conversation> {
        let (a, b) = (a.clone(), b.clone());
        self.run(move |db| db.resolve_conversation(&a, &b)).await
    }

    pub async fn count_conversations(&self, a: &UserId, b: &UserId) -> Result<u32> {
        let (a, b) = (a.clone(), b.clone());
        self.run(move |db| db.count_conversations(&a, &b)).await
    }

    // -- messages --

    pub async fn append_message(&self, message: Message) -> Result<Message> {
        self.run(move |db| {
            db.append_message(&message)?;
            Ok(message)
        })
        .await
    }

    pub async fn get_message(&self, id: Uuid) -> Result<Message> {
        self.run(move |db| db.get_message_by_id(id)).await
    }

    /// Messages exchanged between `a` and `b`, oldest first. Empty when the
    /// pair has never talked.
    pub async fn conversation_messages(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        let (a, b) = (a.clone(), b.clone());
        self.run(move |db| match db.find_conversation(&a, &b)? {
            Some(conversation) => db.get_messages_for_conversation(conversation.id),
            None => Ok(Vec::new()),
        })
        .await
    }

    pub async fn update_message_text(
        &self,
        id: Uuid,
        text: String,
        edited_at: DateTime<Utc>,
    ) -> Result<Message> {
        self.run(move |db| db.update_message_text(id, &text, edited_at))
            .await
    }

    // -- directory --

    /// Fresh read of the identities `owner` has blocked.
    pub async fn block_list(&self, owner: &UserId) -> Result<Vec<UserId>> {
        let owner = owner.clone();
        self.run(move |db| db.block_list(&owner)).await
    }

    pub async fn block(&self, blocker: &UserId, blocked: &UserId) -> Result<Vec<UserId>> {
        let (blocker, blocked) = (blocker.clone(), blocked.clone());
        self.run(move |db| {
            db.block(&blocker, &blocked)?;
            db.block_list(&blocker)
        })
        .await
    }

    pub async fn unblock(&self, blocker: &UserId, blocked: &UserId) -> Result<Vec<UserId>> {
        let (blocker, blocked) = (blocker.clone(), blocked.clone());
        self.run(move |db| {
            db.unblock(&blocker, &blocked)?;
            db.block_list(&blocker)
        })
        .await
    }

    pub async fn profile(&self, id: &UserId) -> Result<Option<UserProfile>> {
        let id = id.clone();
        self.run(move |db| db.get_profile(&id)).await
    }

    pub async fn upsert_profile(&self, profile: UserProfile) -> Result<UserProfile> {
        self.run(move |db| {
            db.upsert_profile(&profile)?;
            Ok(profile)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_resolve_converges() {
        let store = Store::in_memory().unwrap();
        let (alice, bob) = (user("alice"), user("bob"));

        let (left, right) = tokio::join!(
            store.resolve_conversation(&alice, &bob),
            store.resolve_conversation(&bob, &alice),
        );

        assert_eq!(left.unwrap().id, right.unwrap().id);
        assert_eq!(store.count_conversations(&alice, &bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_messages_for_unknown_pair_is_empty() {
        let store = Store::in_memory().unwrap();
        let messages = store
            .conversation_messages(&user("alice"), &user("nobody"))
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_on_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("convo.db")).unwrap();

        let list = store.block(&user("alice"), &user("mallory")).await.unwrap();
        assert_eq!(list, vec![user("mallory")]);
        assert_eq!(store.block_list(&user("alice")).await.unwrap(), list);
    }
}
