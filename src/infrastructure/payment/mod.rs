pub mod mock;
pub mod payplug;

use std::sync::Arc;
use std::time::Duration;

use crate::application::payment_service::PaymentProviders;
use crate::config::PaymentConfig;

use self::mock::MockProvider;
use self::payplug::PayplugProvider;

/// Registers every provider the configuration enables. Floa and Findomestic
/// have no client and are never registered.
pub fn build_providers(config: &PaymentConfig, timeout: Duration) -> Result<PaymentProviders, reqwest::Error> {
    let mut providers = PaymentProviders::new();

    if config.mock_enabled {
        let mock = Arc::new(MockProvider::new(config.mock_webhook_secret.clone()));
        providers.register(mock.clone());
        providers.set_simulator(mock);
    }
    if let Some(secret_key) = &config.payplug_secret_key {
        providers.register(Arc::new(PayplugProvider::new(
            secret_key.clone(),
            &config.payplug_api_url,
            timeout,
        )?));
    }

    log::info!("Payment providers enabled: {:?}", providers.names());
    Ok(providers)
}
