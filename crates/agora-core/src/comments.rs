//! Comment counts shared between views.
//!
//! When one view changes the number of comments on a post (posting or
//! deleting), other views showing the same post learn about it through
//! `CommentCounts` instead of refetching.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::events::{Listeners, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentCountChanged {
    pub post_id: i64,
    pub count: u32,
}

#[derive(Default)]
pub struct CommentCounts {
    counts: Mutex<HashMap<i64, u32>>,
    listeners: Listeners<CommentCountChanged>,
}

impl CommentCounts {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<i64, u32>> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the new count and notify every subscriber
    pub fn update(&self, post_id: i64, count: u32) {
        self.counts().insert(post_id, count);
        self.listeners.emit(&CommentCountChanged { post_id, count });
    }

    pub fn get(&self, post_id: i64) -> Option<u32> {
        self.counts().get(&post_id).copied()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&CommentCountChanged) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }
}
