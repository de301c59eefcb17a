use anyhow::Context;

use crate::{
    config::Config,
    events::EventBus,
    reconcile::KeyedStore,
    stores::{FaviconCache, FavoritesStore, RecentsStore, StationPropertiesStore, UpgradeState},
};

/// Owns every store the upgrade touches. One writer at a time.
pub struct AppState {
    pub config: Config,
    pub favorites: FavoritesStore,
    pub recents: RecentsStore,
    pub properties: StationPropertiesStore,
    pub favicons: FaviconCache,
    pub upgrade_state: UpgradeState,
    pub events: EventBus,
}

impl AppState {
    pub async fn initialize(config: Config) -> anyhow::Result<Self> {
        let stores = &config.stores;
        let favorites = FavoritesStore::load(&stores.favorites_path)
            .await
            .context("failed to load favorites")?;
        let recents = RecentsStore::load(&stores.recents_path, stores.max_recents)
            .await
            .context("failed to load recents")?;
        let properties = StationPropertiesStore::load(&stores.station_properties_path)
            .await
            .context("failed to load station properties")?;
        let favicons = FaviconCache::load(&stores.favicon_cache_dir)
            .await
            .context("failed to index favicon cache")?;
        let upgrade_state = UpgradeState::load(&stores.upgrade_state_path)
            .await
            .context("failed to load upgrade state")?;

        Ok(Self {
            config,
            favorites,
            recents,
            properties,
            favicons,
            upgrade_state,
            events: EventBus::new(),
        })
    }

    pub fn keyed_stores(&mut self) -> [&mut dyn KeyedStore; 4] {
        [
            &mut self.favorites,
            &mut self.recents,
            &mut self.properties,
            &mut self.favicons,
        ]
    }

    /// Persists every keyed store that changed.
    pub async fn save_stores(&mut self) -> anyhow::Result<()> {
        self.favorites
            .save()
            .await
            .context("failed to save favorites")?;
        self.recents.save().await.context("failed to save recents")?;
        self.properties
            .save()
            .await
            .context("failed to save station properties")?;
        self.favicons
            .save()
            .await
            .context("failed to update favicon cache")?;
        Ok(())
    }
}
