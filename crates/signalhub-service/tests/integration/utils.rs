use signalhub_service::config::Config;
use signalhub_service::services::SharedServices;
use signalhub_sources::ProviderConfig;
use signalhub_test as test;

pub use test::{Behavior, EXHAUSTED_API_KEY, ProviderServer, VALID_API_KEY, VALID_CLIENT_ID};

/// Sets up tests and creates the services, with providers served by `server`.
///
/// The remote cache is disabled, regardless of the environment. The `update_config` closure can
/// modify the configuration before the services are created.
pub fn setup_services(
    providers: Vec<ProviderConfig>,
    update_config: impl FnOnce(&mut Config),
) -> SharedServices {
    test::setup();

    let mut config = Config {
        providers,
        ..Default::default()
    };
    config.caches.remote = None;
    update_config(&mut config);

    SharedServices::new(&config, tokio::runtime::Handle::current()).unwrap()
}

/// All four provider types, configured with valid credentials.
pub fn all_providers(server: &ProviderServer) -> Vec<ProviderConfig> {
    vec![
        server.hackernews("hackernews", Behavior::Ok),
        server.newsapi("news", Behavior::Ok, Some(VALID_API_KEY)),
        server.reddit("reddit", Behavior::Ok, Some(VALID_CLIENT_ID)),
        server.youtube("youtube", Behavior::Ok, Some(VALID_API_KEY)),
    ]
}
