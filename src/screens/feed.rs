use super::catalog::{CATALOG, CatalogService, FEED_UPDATED};
use super::FEED;
use crate::error::{Error, Result};
use crate::host::{
    Delivery, DiscardReason, Screen, ScreenCommand, ScreenContext, ScreenController,
    SubscriptionDescriptor,
};
use crate::navigation::Destination;
use crate::services::ServiceDirectory;
use std::sync::Arc;

/// One feed of the catalog
///
/// Built from `feedId` alone; everything shown is read back from the
/// catalog service, so a recreated screen looks exactly like the one it
/// replaces.
pub struct FeedScreen {
    feed_id: i64,
    title: String,
    items: usize,
    catalog: Arc<CatalogService>,
}

impl FeedScreen {
    pub fn feed_id(&self) -> i64 {
        self.feed_id
    }

    pub fn item_count(&self) -> usize {
        self.items
    }
}

impl Screen for FeedScreen {
    fn create(destination: &Destination, directory: &ServiceDirectory) -> Result<Self> {
        let feed_id = destination
            .params()
            .get_i64("feedId")
            .ok_or_else(|| Error::invalid_param("feedId", "must be an integer"))?;

        let catalog = directory.get(CATALOG)?;
        let feed = catalog
            .feed(feed_id)
            .ok_or_else(|| Error::instantiation(FEED, format!("feed {} does not exist", feed_id)))?;

        Ok(Self {
            feed_id,
            title: feed.title,
            items: feed.items.len(),
            catalog,
        })
    }
}

impl ScreenController for FeedScreen {
    fn title(&self) -> &str {
        &self.title
    }

    fn attach(&mut self, ctx: &mut ScreenContext<'_>) -> Result<()> {
        ctx.subscribe(SubscriptionDescriptor::topic(FEED_UPDATED).keyed(self.feed_id.to_string()))?;
        Ok(())
    }

    fn on_event(
        &mut self,
        _ctx: &mut ScreenContext<'_>,
        event: &Delivery,
    ) -> Option<ScreenCommand> {
        if event.payload["feedId"].as_i64() != Some(self.feed_id) {
            return None;
        }

        if event.payload["removed"].as_bool().unwrap_or(false) {
            log::info!("Feed {} was removed while open, going back", self.feed_id);
            return Some(ScreenCommand::Back);
        }

        if let Some(feed) = self.catalog.feed(self.feed_id) {
            self.title = feed.title;
            self.items = feed.items.len();
        }
        None
    }

    fn detach(&mut self, reason: DiscardReason) {
        log::debug!("Feed {} detached ({:?})", self.feed_id, reason);
    }
}
