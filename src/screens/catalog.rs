use crate::host::EventBus;
use crate::services::ServiceKey;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

pub const CATALOG: ServiceKey<CatalogService> = ServiceKey::new("catalog");

/// Topic published whenever the set of feeds changes
pub const CATALOG_UPDATED: &str = "catalog.updated";

/// Topic published when one feed's contents change; payload carries `feedId`
pub const FEED_UPDATED: &str = "feed.updated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    pub items: Vec<String>,
}

/// Durable feed data shared by every screen
///
/// Lives in the service directory, so it survives any number of screen and
/// surface recreations.
pub struct CatalogService {
    feeds: Mutex<BTreeMap<i64, Feed>>,
    events: Arc<EventBus>,
}

impl CatalogService {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            feeds: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    /// Catalog pre-filled with a few feeds for the demo binary
    pub fn with_demo_feeds(events: Arc<EventBus>) -> Self {
        let catalog = Self::new(events);
        {
            let mut feeds = catalog.feeds.lock().unwrap_or_else(PoisonError::into_inner);
            for (id, title) in [(7, "Release notes"), (42, "Engineering"), (99, "Announcements")] {
                feeds.insert(
                    id,
                    Feed {
                        id,
                        title: title.to_string(),
                        items: Vec::new(),
                    },
                );
            }
        }
        catalog
    }

    pub fn feed(&self, id: i64) -> Option<Feed> {
        self.feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Fetch a feed without blocking the caller's runtime
    pub async fn load_feed(&self, id: i64) -> Option<Feed> {
        tokio::task::yield_now().await;
        self.feed(id)
    }

    pub fn feeds(&self) -> Vec<Feed> {
        self.feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create or rename a feed
    pub fn upsert_feed(&self, id: i64, title: impl Into<String>) {
        let title = title.into();
        let created = {
            let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
            match feeds.get_mut(&id) {
                Some(feed) => {
                    feed.title = title;
                    false
                }
                None => {
                    feeds.insert(
                        id,
                        Feed {
                            id,
                            title,
                            items: Vec::new(),
                        },
                    );
                    true
                }
            }
        };

        if created {
            self.notify(CATALOG_UPDATED, json!({ "added": id }));
        } else {
            self.notify(FEED_UPDATED, json!({ "feedId": id }));
        }
    }

    /// Append an item to a feed; returns false if the feed does not exist
    pub fn post(&self, id: i64, item: impl Into<String>) -> bool {
        let posted = self
            .feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
            .map(|feed| feed.items.push(item.into()))
            .is_some();

        if posted {
            self.notify(FEED_UPDATED, json!({ "feedId": id }));
        }
        posted
    }

    pub fn remove_feed(&self, id: i64) -> Option<Feed> {
        let removed = self
            .feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        if removed.is_some() {
            self.notify(FEED_UPDATED, json!({ "feedId": id, "removed": true }));
            self.notify(CATALOG_UPDATED, json!({ "removed": id }));
        }
        removed
    }

    fn notify(&self, topic: &str, payload: Value) {
        if let Err(err) = self.events.publish(topic, &payload) {
            log::error!("Catalog change not announced: {}", err);
        }
    }
}
