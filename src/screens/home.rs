use super::catalog::{CATALOG, CATALOG_UPDATED, CatalogService};
use crate::error::Result;
use crate::host::{
    Delivery, Screen, ScreenCommand, ScreenContext, ScreenController, SubscriptionDescriptor,
};
use crate::navigation::Destination;
use crate::services::ServiceDirectory;
use std::sync::Arc;

/// Landing screen listing the catalog
pub struct HomeScreen {
    catalog: Arc<CatalogService>,
    feeds: usize,
}

impl HomeScreen {
    pub fn feed_count(&self) -> usize {
        self.feeds
    }
}

impl Screen for HomeScreen {
    fn create(_destination: &Destination, directory: &ServiceDirectory) -> Result<Self> {
        let catalog = directory.get(CATALOG)?;
        Ok(Self {
            feeds: catalog.len(),
            catalog,
        })
    }
}

impl ScreenController for HomeScreen {
    fn title(&self) -> &str {
        "Home"
    }

    fn attach(&mut self, ctx: &mut ScreenContext<'_>) -> Result<()> {
        ctx.subscribe(SubscriptionDescriptor::topic(CATALOG_UPDATED))?;
        Ok(())
    }

    fn on_event(
        &mut self,
        _ctx: &mut ScreenContext<'_>,
        _event: &Delivery,
    ) -> Option<ScreenCommand> {
        self.feeds = self.catalog.len();
        log::debug!("Home now lists {} feed(s)", self.feeds);
        None
    }
}
