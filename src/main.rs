//! Service binary: wires configuration, persistence, broker and the two
//! state consumers, then runs until interrupted.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use persondata_sync_client::config::ClientConfig;
use persondata_sync_client::constants::queues;
use persondata_sync_client::database;
use persondata_sync_client::errors::ClientResult;
use persondata_sync_client::logging::init_logging;
use persondata_sync_client::messaging::service::providers::RabbitMqBroker;
use persondata_sync_client::messaging::{MessageBroker, Topology};
use persondata_sync_client::repository::{
    PostgresSedexMessageRepository, PostgresSettingRepository, PostgresSyncJobRepository,
    PostgresTransactionRepository,
};
use persondata_sync_client::state::{
    QueueConsumer, SedexMessageStateProcessor, TransactionStateProcessor,
};
use persondata_sync_client::sync::FullSyncStateManager;

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        error!(error = %e, "Sync client terminated");
        std::process::exit(1);
    }
}

async fn run() -> ClientResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::from_toml_file(path)?,
        None => ClientConfig::from_env()?,
    };

    let pool = database::connect_pool(&config.database).await?;
    database::migrate(&pool).await?;

    let broker: Arc<dyn MessageBroker> =
        Arc::new(RabbitMqBroker::connect(config.rabbitmq.clone()).await?);
    broker.declare_topology(&Topology::standard()).await?;
    info!(provider = broker.provider_name(), "Broker topology declared");

    let settings = Arc::new(PostgresSettingRepository::new(pool.clone()));
    let transactions = Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let sync_jobs = Arc::new(PostgresSyncJobRepository::new(pool.clone()));
    let sedex_messages = Arc::new(PostgresSedexMessageRepository::new(pool.clone()));

    let full_sync_state_manager = Arc::new(FullSyncStateManager::restore(settings).await?);

    let transaction_processor = Arc::new(TransactionStateProcessor::new(
        transactions,
        sync_jobs.clone(),
        Some(full_sync_state_manager.clone()),
    ));
    let sedex_processor = Arc::new(SedexMessageStateProcessor::new(
        sedex_messages,
        sync_jobs,
        Some(full_sync_state_manager),
    ));

    let transaction_consumer = Arc::new(QueueConsumer::new(
        broker.clone(),
        transaction_processor,
        queues::TRANSACTION_STATE,
        config.consumers.transaction_state.clone(),
    ));
    let sedex_consumer = Arc::new(QueueConsumer::new(
        broker.clone(),
        sedex_processor,
        queues::SEDEX_STATE,
        config.consumers.sedex_state.clone(),
    ));

    transaction_consumer.clone().start();
    sedex_consumer.clone().start();
    info!("Sync client running, press ctrl-c to stop");

    signal::ctrl_c()
        .await
        .map_err(|e| persondata_sync_client::ClientError::Configuration(e.to_string()))?;

    info!("Shutdown signal received, draining consumers");
    transaction_consumer.stop().await;
    sedex_consumer.stop().await;

    Ok(())
}
