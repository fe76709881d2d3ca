use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use badgesmith::auth::HmacAuthenticator;
use badgesmith::config::Config;
use badgesmith::dispatcher::{Dispatcher, standard_routes};
use badgesmith::handlers::{AppContext, HandlerRegistry};
use badgesmith::providers::ProviderRegistry;
use badgesmith::providers::github::GitHubProvider;
use badgesmith::providers::nuget::NuGetProvider;
use badgesmith::providers::upstream::UpstreamClient;
use badgesmith::secrets::SecretResolver;
use badgesmith::store::nonce::MemoryNonceStore;
use badgesmith::store::results::MemoryResultStore;
use badgesmith::store::secrets::{FileSecretsBackend, SecretsBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    badgesmith::tracing::init_tracing();
    let config = Config::parse();

    let backend: Arc<dyn SecretsBackend> = match &config.secrets_file {
        Some(path) => Arc::new(FileSecretsBackend::load(path)?),
        None => Arc::new(FileSecretsBackend::empty()),
    };
    let secrets = Arc::new(SecretResolver::new(backend));
    let nonces = Arc::new(MemoryNonceStore::new());
    let results = Arc::new(MemoryResultStore::new());

    // TTL janitor for nonce reservations and run-seen markers.
    {
        let nonces = nonces.clone();
        let results = results.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                nonces.purge_expired();
                results.purge_expired();
            }
        });
    }

    let upstream = Arc::new(UpstreamClient::new(config.upstream())?);
    let providers = ProviderRegistry::new()
        .register(Arc::new(NuGetProvider::new(
            upstream.clone(),
            config.nuget_base_url.clone(),
        )))
        .register(Arc::new(GitHubProvider::new(
            upstream.clone(),
            secrets.clone(),
            config.github_base_url.clone(),
        )));

    let context = Arc::new(AppContext {
        providers,
        results: results.clone(),
        run_marker_ttl: config.run_marker_ttl(),
    });
    let authenticator = Arc::new(HmacAuthenticator::new(
        secrets,
        nonces,
        config.auth_skew(),
        config.nonce_ttl(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(standard_routes()?),
        HandlerRegistry::standard(),
        config.cors(),
        authenticator,
        context,
        config.request_deadline(),
    ));

    let listener = TcpListener::bind(config.bind).await?;
    badgesmith::serve(listener, dispatcher).await.map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}
