//! Pooled TCP delivery with bounded retry and freeze-on-storm backoff.
//!
//! The sender owns a bounded queue and a fixed pool of worker tasks. Each
//! worker runs an independent dial/send loop; a failed write closes the
//! connection, parks the encoded bytes in a retry slot and redials. The
//! retry slot lives outside the worker task so a panicking worker can be
//! respawned without losing the in-flight message.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::gelf::GelfMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub transport: Transport,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("message queue is full")]
    QueueFull,
    #[error("sender stopped")]
    SenderStopped,
}

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("udp transport is not supported")]
    UdpUnsupported,
}

/// Options controlling retry and backoff behaviour of the worker pool.
#[derive(Debug, Clone)]
pub struct SenderOptions {
    pub connection_pool_size: usize,
    pub queue_size: usize,
    pub max_message_send_retry_count: u32,
    pub max_successive_send_error_count: u32,
    pub successive_send_error_freeze_time: Duration,
}

pub struct GraylogSender {
    queue_tx: mpsc::Sender<GelfMessage>,
    cancel: CancellationToken,
}

impl GraylogSender {
    pub fn new(endpoint: Endpoint, options: SenderOptions) -> Result<GraylogSender, SenderError> {
        if endpoint.transport == Transport::Udp {
            return Err(SenderError::UdpUnsupported);
        }

        let (queue_tx, queue_rx) = mpsc::channel(options.queue_size.max(1));
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let cancel = CancellationToken::new();

        for index in 0..options.connection_pool_size.max(1) {
            let worker = Worker {
                index,
                address: format!("{}:{}", endpoint.address, endpoint.port),
                queue: Arc::clone(&queue_rx),
                cancel: cancel.clone(),
                max_retries: options.max_message_send_retry_count,
                max_successive_errors: options.max_successive_send_error_count,
                freeze: options.successive_send_error_freeze_time,
                retry_slot: Arc::new(StdMutex::new(None)),
            };
            tokio::spawn(supervise_worker(worker));
        }

        info!("graylog sender initialized");
        Ok(GraylogSender { queue_tx, cancel })
    }

    /// Non-blocking enqueue: the producer never waits on a saturated queue.
    pub fn enqueue(&self, message: GelfMessage) -> Result<(), EnqueueError> {
        if self.cancel.is_cancelled() {
            return Err(EnqueueError::SenderStopped);
        }
        self.queue_tx.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => EnqueueError::QueueFull,
            TrySendError::Closed(_) => EnqueueError::SenderStopped,
        })
    }

    /// Cancels the sender; workers observe the cancellation before their
    /// next dial or queue take and exit.
    pub fn stop(&self) {
        info!("graylog sender stopping");
        self.cancel.cancel();
    }
}

#[derive(Clone)]
struct Worker {
    index: usize,
    address: String,
    queue: Arc<Mutex<mpsc::Receiver<GelfMessage>>>,
    cancel: CancellationToken,
    max_retries: u32,
    max_successive_errors: u32,
    freeze: Duration,
    /// Encoded bytes of the message currently being retried. Shared with
    /// the supervisor so a worker restart does not drop the message.
    retry_slot: Arc<StdMutex<Option<Vec<u8>>>>,
}

/// Runs a worker and respawns it in place after a panic, with a freeze in
/// between. A clean exit (shutdown or closed queue) ends supervision.
async fn supervise_worker(worker: Worker) {
    let index = worker.index;
    let freeze = worker.freeze;
    loop {
        let instance = worker.clone();
        let handle = tokio::spawn(instance.run());
        match handle.await {
            Ok(()) => break,
            Err(err) if err.is_panic() => {
                error!("panic in graylog worker #{index}: {err:?}");
                tokio::time::sleep(freeze).await;
                info!("restarting graylog worker #{index}");
            }
            Err(_) => break,
        }
    }
    info!("graylog worker #{index} finished");
}

impl Worker {
    async fn run(self) {
        let mut successive_errors: u32 = 0;
        let mut retry_count: u32 = 0;

        'dial: loop {
            if self.cancel.is_cancelled() {
                return;
            }

            info!("worker #{}: creating tcp connection to {}", self.index, self.address);
            let mut stream = tokio::select! {
                _ = self.cancel.cancelled() => return,
                connected = TcpStream::connect(&self.address) => match connected {
                    Ok(stream) => stream,
                    Err(err) => {
                        error!(
                            "worker #{}: error creating tcp connection to {}: {err}",
                            self.index, self.address
                        );
                        tokio::time::sleep(self.freeze).await;
                        continue;
                    }
                },
            };

            loop {
                if self.cancel.is_cancelled() {
                    return;
                }

                if retry_count > self.max_retries {
                    error!(
                        "worker #{}: message skipped after {} retries",
                        self.index,
                        retry_count - 1
                    );
                    self.set_retry_data(None);
                    retry_count = 0;
                }

                let data = match self.retry_data() {
                    Some(data) => {
                        info!("worker #{}: retrying message send #{retry_count}", self.index);
                        data
                    }
                    None => {
                        let message = {
                            let mut queue = self.queue.lock().await;
                            tokio::select! {
                                _ = self.cancel.cancelled() => return,
                                message = queue.recv() => message,
                            }
                        };
                        let Some(message) = message else {
                            info!("worker #{}: queue closed, stopping", self.index);
                            return;
                        };
                        match message.encode() {
                            Ok(data) => data,
                            Err(err) => {
                                error!("worker #{}: error preparing message: {err}", self.index);
                                continue;
                            }
                        }
                    }
                };

                match stream.write_all(&data).await {
                    Ok(()) => {
                        retry_count = 0;
                        successive_errors = 0;
                        self.set_retry_data(None);
                        debug!("worker #{}: message sent", self.index);
                    }
                    Err(err) => {
                        warn!(
                            "worker #{}: failed to send message: {err}; closing connection and retrying",
                            self.index
                        );
                        self.set_retry_data(Some(data));
                        retry_count += 1;
                        successive_errors += 1;
                        if successive_errors > self.max_successive_errors {
                            error!(
                                "worker #{}: {successive_errors} successive errors, freezing for {:?}",
                                self.index, self.freeze
                            );
                            tokio::time::sleep(self.freeze).await;
                            successive_errors = 0;
                        }
                        continue 'dial;
                    }
                }
            }
        }
    }

    fn retry_data(&self) -> Option<Vec<u8>> {
        self.retry_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_retry_data(&self, data: Option<Vec<u8>>) {
        *self.retry_slot.lock().unwrap_or_else(|e| e.into_inner()) = data;
    }
}
