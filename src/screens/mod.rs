//! The demo application: its services, route table and screens

pub mod catalog;
pub mod feed;
pub mod home;
pub mod settings;

pub use catalog::{CATALOG, CATALOG_UPDATED, CatalogService, FEED_UPDATED, Feed};
pub use feed::FeedScreen;
pub use home::HomeScreen;
pub use settings::SettingsScreen;

use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::host::{EVENTS, EventBus, ScreenHostBuilder};
use crate::navigation::{HISTORY, NavParams, NavigationGraph, NavigationHistory, Route};
use crate::services::{ServiceDirectory, ServiceKey};
use std::sync::Arc;

pub const HOME: &str = "home";
pub const FEED: &str = "feed";
pub const SETTINGS: &str = "settings";

/// The loaded configuration, readable by screens
pub const CONFIG: ServiceKey<HostConfig> = ServiceKey::new("config");

/// Register every service the application needs
pub fn register_services(directory: &ServiceDirectory, config: &HostConfig) -> Result<()> {
    let capacity = config.history_capacity();
    directory.register_eager(HISTORY, move |_| Ok(NavigationHistory::with_capacity(capacity)))?;
    directory.register_eager(EVENTS, |_| Ok(EventBus::new()))?;

    let config = config.clone();
    directory.register(CONFIG, move |_| Ok(config.clone()))?;
    directory.register(CATALOG, |directory| {
        Ok(CatalogService::with_demo_feeds(directory.get(EVENTS)?))
    })?;
    Ok(())
}

/// Route table of the application
pub fn build_graph(config: &HostConfig) -> Result<NavigationGraph> {
    let graph = NavigationGraph::new(config.default_route.as_str())
        .with_route(Route::new(HOME))?
        .with_route(
            Route::new(FEED)
                .pattern("feed/:feedId")
                .pattern("feeds/:feedId")
                .require("feedId")
                .resolve_with(|m| {
                    let feed_id = m
                        .params
                        .get_i64("feedId")
                        .ok_or_else(|| Error::invalid_param("feedId", "must be an integer"))?;

                    let mut params = m.params.clone();
                    params.insert("feedId", &feed_id)?;
                    Ok(params)
                }),
        )?
        .with_route(Route::new(SETTINGS).pattern("settings/*section"))?;

    graph.alias("index", HOME)?;
    graph.alias("preferences", SETTINGS)?;
    Ok(graph)
}

/// Attach a controller type to each route
pub fn register_screens(builder: ScreenHostBuilder) -> Result<ScreenHostBuilder> {
    builder
        .screen::<HomeScreen>(HOME)?
        .screen::<FeedScreen>(FEED)?
        .screen::<SettingsScreen>(SETTINGS)
}

/// Register services, seal the directory and prepare the host
pub fn bootstrap(config: &HostConfig) -> Result<ScreenHostBuilder> {
    let directory = Arc::new(ServiceDirectory::new());
    register_services(&directory, config)?;
    directory.seal()?;

    let graph = Arc::new(build_graph(config)?);
    register_screens(ScreenHostBuilder::new(directory, graph).fallback(config.fallback))
}

/// Parameters for opening a feed
pub fn feed_params(feed_id: i64) -> Result<NavParams> {
    NavParams::new().with("feedId", &feed_id)
}
