//! Service lifecycle: start the pipeline, watch it, stop it.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use log_tcp_exporter::LogTcpExporter;
use sentry_metrics_connector::SentryMetricsConnector;
use sentry_receiver::SentryReceiver;
use telemetry_model::{ConsumerError, MetricsConsumer, Traces, TracesConsumer};

use crate::config::ServicesConfig;
use crate::error::ServicesError;

/// Status of the collector services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Replicates one trace batch to every wired consumer, in order. The first
/// failure wins so the receiver can map it to a response code.
pub struct FanoutTracesConsumer {
    consumers: Vec<Arc<dyn TracesConsumer>>,
}

impl FanoutTracesConsumer {
    pub fn new(consumers: Vec<Arc<dyn TracesConsumer>>) -> FanoutTracesConsumer {
        FanoutTracesConsumer { consumers }
    }
}

#[async_trait]
impl TracesConsumer for FanoutTracesConsumer {
    async fn consume_traces(&self, traces: Traces) -> Result<(), ConsumerError> {
        for consumer in &self.consumers {
            consumer.consume_traces(traces.clone()).await?;
        }
        Ok(())
    }
}

/// Handle to the running services.
#[derive(Clone)]
pub struct ServicesHandle {
    status: Arc<RwLock<ServiceStatus>>,
    status_tx: broadcast::Sender<ServiceStatus>,
    shutdown: CancellationToken,
    local_addr: SocketAddr,
}

impl ServicesHandle {
    pub async fn is_running(&self) -> bool {
        matches!(*self.status.read().await, ServiceStatus::Running)
    }

    pub fn status_receiver(&self) -> broadcast::Receiver<ServiceStatus> {
        self.status_tx.subscribe()
    }

    /// Address the receiver is actually bound to; useful with a `:0` port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals shutdown. The receiver drains in-flight handlers and the
    /// exporter's sender pool is cancelled.
    pub async fn stop(&self) -> Result<(), ServicesError> {
        let mut status = self.status.write().await;
        if *status == ServiceStatus::Stopped {
            return Ok(());
        }
        *status = ServiceStatus::Stopping;
        drop(status);

        self.shutdown.cancel();
        Ok(())
    }
}

/// Builds and runs the receiver → {connector, exporter} pipeline.
pub struct CollectorServices {
    config: ServicesConfig,
}

impl CollectorServices {
    pub fn new(config: ServicesConfig) -> CollectorServices {
        CollectorServices { config }
    }

    /// Starts the pipeline. Metrics flow into the given consumer; an
    /// optional external traces consumer receives every batch after the
    /// connector and the exporter.
    pub async fn start(
        self,
        metrics_consumer: Arc<dyn MetricsConsumer>,
        external_traces_consumer: Option<Arc<dyn TracesConsumer>>,
    ) -> Result<ServicesHandle, ServicesError> {
        self.config.validate()?;

        let status = Arc::new(RwLock::new(ServiceStatus::Starting));
        let (status_tx, _) = broadcast::channel(16);

        debug!("starting log tcp exporter");
        let exporter = Arc::new(
            LogTcpExporter::start(self.config.exporter.clone())
                .map_err(|e| ServicesError::ExporterStart(e.to_string()))?,
        );

        let connector = Arc::new(SentryMetricsConnector::new(
            self.config.connector.clone(),
            metrics_consumer,
        ));

        let mut consumers: Vec<Arc<dyn TracesConsumer>> = vec![connector, exporter.clone()];
        if let Some(external) = external_traces_consumer {
            consumers.push(external);
        }
        let fanout = Arc::new(FanoutTracesConsumer::new(consumers));

        let listener = tokio::net::TcpListener::bind(&self.config.receiver.endpoint)
            .await
            .map_err(|e| ServicesError::ReceiverStart(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServicesError::ReceiverStart(e.to_string()))?;

        let receiver = Arc::new(SentryReceiver::new(
            Arc::new(self.config.receiver.clone()),
            fanout,
        ));
        let shutdown = receiver.shutdown_token();

        {
            let status = Arc::clone(&status);
            let status_tx = status_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = receiver.serve(listener).await {
                    error!("receiver error: {e}");
                }
                exporter.stop();
                let mut status = status.write().await;
                *status = ServiceStatus::Stopped;
                let _ = status_tx.send(ServiceStatus::Stopped);
            });
        }

        info!("collector services running on {local_addr}");
        {
            let mut status = status.write().await;
            *status = ServiceStatus::Running;
        }
        let _ = status_tx.send(ServiceStatus::Running);

        Ok(ServicesHandle {
            status,
            status_tx,
            shutdown,
            local_addr,
        })
    }
}
