use std::net::SocketAddr;
use std::sync::Arc;

use scholar_pipeline::{
    broker::{Consumer, Publisher, QueueTransport, RedisTransport, ShutdownSignal},
    config::AppConfig,
    models::StageKind,
    pipeline::{StageDriver, StageProcessor, StageRoute},
    services::{
        classify::{ClassifyStage, HttpTextClassifier},
        crossref::CrossrefClient,
        extract::{ExtractStage, OpenAccessTextSource},
        harvest::{HarvestStage, HttpPublicationSource},
        http_client,
        originality::{HttpOriginalityChecker, OriginalityStage},
        resolve::ResolveStage,
        resolver::{IdentityResolver, ResolverConfig},
        unpaywall::UnpaywallClient,
    },
    store::{JobStateStore, RedisJobStore},
    telemetry,
};
use tokio::sync::watch;

/// Connections shared by whichever stage this process runs.
struct Runtime {
    config: AppConfig,
    store: Arc<RedisJobStore>,
    transport: Arc<RedisTransport>,
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    telemetry::init_tracing();

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");
    let stage = config
        .pipeline_stage
        .expect("PIPELINE_STAGE must name the stage this worker runs");

    tracing::info!(stage = %stage, "Starting pipeline worker");

    // Initialize Prometheus scrape listener, if configured
    if let Some(addr) = config.metrics_addr.as_deref() {
        let addr: SocketAddr = addr.parse().expect("METRICS_ADDR must be a socket address");
        telemetry::install_listener(addr).expect("Failed to install Prometheus metrics listener");
        tracing::info!(addr = %addr, "Metrics listener started");
    }

    // Initialize Redis job state store
    tracing::info!("Connecting to Redis job state store");
    let store = Arc::new(
        RedisJobStore::connect(&config.redis_url, config.job_ttl_seconds)
            .await
            .expect("Failed to connect to job state store"),
    );

    // Initialize queue transport
    tracing::info!("Connecting to queue transport");
    let transport = Arc::new(
        RedisTransport::connect(config.broker_url())
            .await
            .expect("Failed to connect to queue transport"),
    );

    // Stop consuming on ctrl-c
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        shutdown_tx.send(true).ok();
    });

    let runtime = Runtime {
        config,
        store,
        transport,
    };

    // Initialize services
    let http = http_client(runtime.config.http_timeout()).expect("Failed to build HTTP client");
    let concurrency = runtime.config.record_concurrency;
    let crossref = || {
        CrossrefClient::new(
            http.clone(),
            &runtime.config.crossref_api_url,
            &runtime.config.crossref_mailto,
        )
    };
    let unpaywall = || {
        UnpaywallClient::new(
            http.clone(),
            &runtime.config.unpaywall_api_url,
            &runtime.config.unpaywall_email,
        )
    };

    // Run the configured stage until shutdown
    match stage {
        StageKind::Harvest => {
            let source = HttpPublicationSource::new(http.clone(), runtime.config.harvest_api_urls());
            runtime
                .run(HarvestStage::new(Arc::new(source)), shutdown_rx)
                .await;
        }
        StageKind::Resolve => {
            let resolver = IdentityResolver::new(
                Arc::new(crossref()),
                ResolverConfig {
                    title_threshold: runtime.config.title_sim_threshold,
                    author_threshold: runtime.config.author_sim_threshold,
                    rows: runtime.config.candidate_rows,
                    scorer: runtime.config.similarity_scorer,
                },
            );
            let processor = ResolveStage::new(resolver, Arc::new(unpaywall()), concurrency);
            runtime.run(processor, shutdown_rx).await;
        }
        StageKind::Extract => {
            let source = OpenAccessTextSource::new(http.clone(), unpaywall(), crossref());
            runtime
                .run(ExtractStage::new(Arc::new(source), concurrency), shutdown_rx)
                .await;
        }
        StageKind::Classify => {
            let classifier = HttpTextClassifier::new(
                http.clone(),
                runtime.config.classifier_api_url.clone(),
                runtime.config.classifier_api_key.clone(),
            );
            runtime
                .run(ClassifyStage::new(Arc::new(classifier), concurrency), shutdown_rx)
                .await;
        }
        StageKind::Originality => {
            let checker = HttpOriginalityChecker::new(
                http.clone(),
                crossref(),
                runtime.config.originality_api_url.clone(),
                runtime.config.originality_api_key.clone(),
            );
            runtime
                .run(OriginalityStage::new(Arc::new(checker), concurrency), shutdown_rx)
                .await;
        }
    }

    runtime.close().await;
    tracing::info!(stage = %stage, "Worker stopped");
}

impl Runtime {
    /// Consume the stage's input queue until shutdown.
    async fn run<P: StageProcessor>(&self, processor: P, shutdown: ShutdownSignal) {
        let stage = processor.kind();
        let route = StageRoute::for_stage(stage, &self.config.queues());
        let queue = route.input_queue.clone();

        let store: Arc<dyn JobStateStore> = self.store.clone();
        let transport: Arc<dyn QueueTransport> = self.transport.clone();
        let driver = StageDriver::new(processor, store, Publisher::new(transport.clone()), route);

        let consumer = Consumer::new(transport, self.config.consumer_name(stage))
            .with_dead_letter(self.config.dead_letter_queue.clone());

        tracing::info!(stage = %stage, queue = %queue, "Worker ready, consuming");
        if let Err(e) = consumer
            .consume(&queue, Arc::new(driver), self.config.prefetch_count, shutdown)
            .await
        {
            tracing::error!(stage = %stage, queue = %queue, error = %e, "Consumer stopped on error");
        }
    }

    async fn close(self) {
        if let Ok(store) = Arc::try_unwrap(self.store) {
            store.close().await;
        }
        if let Ok(transport) = Arc::try_unwrap(self.transport) {
            transport.close().await;
        }
    }
}
