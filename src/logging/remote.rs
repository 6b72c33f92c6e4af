//! Best-effort remote telemetry sink.
//!
//! Records are queued on a bounded channel and POSTed as JSON, one by one, by a
//! single background task. The request path only ever does a `try_send`, so a
//! slow or unreachable collector costs at most a dropped record. Each POST is
//! bounded by the client timeout; failures are reported through a local-only
//! logger, so they obey the same minimum level as everything else.
//!
//! On shutdown, [`RemoteSinkHandle::drain`] stops the queue from accepting new
//! records and gives the ones already queued a bounded time to go out.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{delivery_failure_record, LogRecord, LogSink, Logger, SinkError};

/// Sink that ships records to an HTTP collector.
#[derive(Debug, Clone)]
pub struct RemoteSink {
    tx: mpsc::Sender<LogRecord>,
}

/// Controls the delivery task behind a [`RemoteSink`].
#[derive(Debug)]
pub struct RemoteSinkHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RemoteSink {
    /// Start the delivery task and return the sink feeding it.
    ///
    /// `reporter` receives delivery failures; it must not itself contain this
    /// sink. Must be called from within a Tokio runtime.
    pub fn spawn(
        url: impl Into<String>,
        timeout: Duration,
        queue_capacity: usize,
        reporter: Logger,
    ) -> Result<(Self, RemoteSinkHandle), SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Delivery(format!("failed to build HTTP client: {e}")))?;

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_delivery(client, url.into(), rx, shutdown_rx, reporter));

        Ok((Self { tx }, RemoteSinkHandle { shutdown, task }))
    }
}

impl RemoteSinkHandle {
    /// Stop accepting records and wait up to `timeout` for queued ones to be
    /// delivered. Returns whether the queue drained in time.
    pub async fn drain(self, timeout: Duration) -> bool {
        let _ = self.shutdown.send(());
        matches!(tokio::time::timeout(timeout, self.task).await, Ok(Ok(())))
    }
}

impl LogSink for RemoteSink {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn deliver(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.tx.try_send(record.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

async fn run_delivery(
    client: reqwest::Client,
    url: String,
    mut rx: mpsc::Receiver<LogRecord>,
    mut shutdown: oneshot::Receiver<()>,
    reporter: Logger,
) {
    let mut shutdown_seen = false;
    loop {
        let record = tokio::select! {
            record = rx.recv() => record,
            signal = &mut shutdown, if !shutdown_seen => {
                shutdown_seen = true;
                // A dropped handle is not a shutdown request
                if signal.is_ok() {
                    rx.close();
                }
                continue;
            }
        };
        let Some(record) = record else {
            break;
        };

        if let Err(e) = post_record(&client, &url, &record).await {
            reporter.emit(delivery_failure_record("remote", &e, &record));
        }
    }
    tracing::debug!("Remote log sink queue closed");
}

async fn post_record(
    client: &reqwest::Client,
    url: &str,
    record: &LogRecord,
) -> Result<(), reqwest::Error> {
    client
        .post(url)
        .json(record)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
