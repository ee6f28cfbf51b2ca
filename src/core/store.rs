//! Persistence for chat turns.
//!
//! The client only needs `get` and `set`, so that is the whole trait. The
//! default [`LruMessageStore`] keeps the most recent turns in memory; anything
//! durable (a database, a remote cache) plugs in by implementing
//! [`MessageStore`] or wrapping a pair of async functions in [`FnMessageStore`].

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use lru::LruCache;
use tokio::sync::{Mutex, RwLock};

use crate::core::constants::DEFAULT_STORE_CAPACITY;
use crate::core::error::ChatError;
use crate::core::message::ChatMessage;

/// Key-value storage for [`ChatMessage`]s, keyed by message id.
///
/// Implementations must tolerate concurrent calls from independent chains.
/// Concurrent writes to the same id are last-write-wins.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ChatMessage>, ChatError>;
    async fn set(&self, id: &str, message: ChatMessage) -> Result<(), ChatError>;
}

/// Bounded in-memory store that evicts the least recently touched turn.
pub struct LruMessageStore {
    cache: Mutex<LruCache<String, ChatMessage>>,
}

impl LruMessageStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }

    /// Membership check that does not count as a touch.
    pub async fn contains(&self, id: &str) -> bool {
        self.cache.lock().await.contains(id)
    }
}

impl Default for LruMessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}

#[async_trait]
impl MessageStore for LruMessageStore {
    async fn get(&self, id: &str) -> Result<Option<ChatMessage>, ChatError> {
        Ok(self.cache.lock().await.get(id).cloned())
    }

    async fn set(&self, id: &str, message: ChatMessage) -> Result<(), ChatError> {
        self.cache.lock().await.put(id.to_string(), message);
        Ok(())
    }
}

/// Unbounded map, handy for tests and short-lived tools.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<HashMap<String, ChatMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn get(&self, id: &str) -> Result<Option<ChatMessage>, ChatError> {
        Ok(self.messages.read().await.get(id).cloned())
    }

    async fn set(&self, id: &str, message: ChatMessage) -> Result<(), ChatError> {
        self.messages.write().await.insert(id.to_string(), message);
        Ok(())
    }
}

type GetMessageFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Option<ChatMessage>, ChatError>> + Send + Sync>;
type UpsertMessageFn =
    Arc<dyn Fn(ChatMessage) -> BoxFuture<'static, Result<(), ChatError>> + Send + Sync>;

/// Store backed by caller-supplied lookup and upsert functions.
///
/// The upsert function receives the whole message and keys it by
/// `message.id`.
#[derive(Clone)]
pub struct FnMessageStore {
    get_message_by_id: GetMessageFn,
    upsert_message: UpsertMessageFn,
}

impl FnMessageStore {
    pub fn new<G, GF, U, UF>(get_message_by_id: G, upsert_message: U) -> Self
    where
        G: Fn(String) -> GF + Send + Sync + 'static,
        GF: Future<Output = Result<Option<ChatMessage>, ChatError>> + Send + 'static,
        U: Fn(ChatMessage) -> UF + Send + Sync + 'static,
        UF: Future<Output = Result<(), ChatError>> + Send + 'static,
    {
        Self {
            get_message_by_id: Arc::new(move |id| get_message_by_id(id).boxed()),
            upsert_message: Arc::new(move |message| upsert_message(message).boxed()),
        }
    }
}

#[async_trait]
impl MessageStore for FnMessageStore {
    async fn get(&self, id: &str) -> Result<Option<ChatMessage>, ChatError> {
        (self.get_message_by_id)(id.to_string()).await
    }

    async fn set(&self, _id: &str, message: ChatMessage) -> Result<(), ChatError> {
        (self.upsert_message)(message).await
    }
}
