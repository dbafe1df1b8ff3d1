mod config;

use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info, warn};

use toychat_broker::{Dispatcher, ExchangeClient, NatsTransport};
use toychat_db::Database;
use toychat_types::codec;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toychat=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path, &config.db)?;
    info!("Database ready at {} ({} connections)", config.db_path.display(), db.pool_size());

    let transport = NatsTransport::connect(&config.nats_url).await?;

    let dispatcher = Dispatcher::new(transport.clone(), Arc::new(db), config.dispatcher());
    let mut service = tokio::spawn(dispatcher.run());

    // An empty payload comes back as a malformed-envelope reply once the
    // dispatcher is subscribed.
    let self_check = ExchangeClient::new(transport, config.client());
    match self_check.send(&config.subject, Bytes::new()).await {
        Ok(reply) => match codec::decode(&reply).map(|e| e.outcome()) {
            Ok(Err(_)) => info!("Storage manager listening on {:?}", config.subject),
            _ => warn!("Unexpected self-check reply on {:?}", config.subject),
        },
        Err(e) => warn!("Self-check on {:?} failed: {}", config.subject, e),
    }

    tokio::select! {
        res = &mut service => match res {
            Ok(Ok(())) => warn!("Subscription on {:?} closed", config.subject),
            Ok(Err(e)) => {
                error!("Dispatcher stopped: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                error!("Dispatcher task failed: {}", e);
                return Err(e.into());
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            service.abort();
        }
    }

    Ok(())
}
