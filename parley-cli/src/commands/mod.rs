pub mod config;
pub mod play;
pub mod scenario;

use std::sync::Arc;

use parley_models::auth::ApiKey;
use parley_models::providers::{ChatCompletionsProvider, TextGenerator};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::offline;

/// Build the text generator for a command.
pub(crate) fn generator(config: &ProviderConfig, offline: bool) -> Arc<dyn TextGenerator> {
    if offline {
        debug!("Using offline generator");
        return Arc::new(offline::provider());
    }

    let mut provider =
        ChatCompletionsProvider::with_base_url(&config.base_url).with_timeout(config.timeout());
    match ApiKey::from_env(&config.api_key_env) {
        Ok(key) => provider = provider.with_api_key(key),
        Err(e) => warn!(error = %e, "No API key, sending unauthenticated requests"),
    }
    debug!(base_url = provider.base_url(), "Using chat completions provider");
    Arc::new(provider)
}
