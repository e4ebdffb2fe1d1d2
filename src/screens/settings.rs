use super::CONFIG;
use crate::config::HostConfig;
use crate::error::Result;
use crate::host::{Screen, ScreenContext, ScreenController};
use crate::navigation::Destination;
use crate::services::ServiceDirectory;
use std::sync::Arc;

pub struct SettingsScreen {
    section: Option<String>,
    config: Arc<HostConfig>,
}

impl SettingsScreen {
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }
}

impl Screen for SettingsScreen {
    fn create(destination: &Destination, directory: &ServiceDirectory) -> Result<Self> {
        Ok(Self {
            section: destination.params().get_str("section").map(str::to_string),
            config: directory.get(CONFIG)?,
        })
    }
}

impl ScreenController for SettingsScreen {
    fn title(&self) -> &str {
        "Settings"
    }

    fn attach(&mut self, _ctx: &mut ScreenContext<'_>) -> Result<()> {
        Ok(())
    }
}
