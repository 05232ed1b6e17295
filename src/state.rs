//! Shared application state handed to every handler

use std::sync::Arc;

use crate::account::AccountService;
use crate::config::AppConfig;
use crate::links::LinkService;
use crate::shortcode::ShortCodeGenerator;
use crate::store::Store;
use crate::token::TokenService;

#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub accounts: AccountService,
    pub links: LinkService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wires the services on top of `store`
    ///
    /// # Example Usage
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use byteurl::config::AppConfig;
    /// # use byteurl::database::{init_db, RedbStore};
    /// # use byteurl::state::AppState;
    /// let config = AppConfig::from_env().unwrap();
    /// let store = RedbStore::new(init_db(&config.database_path).unwrap());
    /// let state = AppState::new(config, Arc::new(store));
    /// ```
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Self {
        let codes = ShortCodeGenerator::new(config.short_code_length);
        Self {
            tokens: Arc::new(TokenService::new(&config.auth)),
            accounts: AccountService::new(store.clone()),
            links: LinkService::new(store, codes),
            config: Arc::new(config),
        }
    }
}
