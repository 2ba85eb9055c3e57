//! Fan-in of service error signals.
//!
//! Every launched service hands back an [`ErrorSignal`]: a single-slot
//! channel that carries at most one error and is closed when the service
//! stops. A clean stop closes the channel without sending anything.
//! [`merge`] combines any number of these into one stream and
//! [`supervise`] blocks on it until the first error or until every
//! source has closed.

use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[derive(Debug, thiserror::Error)]
#[error("{service} server failed: {source}")]
pub struct ServiceError {
    service: String,
    #[source]
    source: std::io::Error,
}

impl ServiceError {
    pub fn new(service: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            service: service.into(),
            source,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

pub type ErrorSignal = mpsc::Receiver<ServiceError>;
pub type ErrorReporter = mpsc::Sender<ServiceError>;

/// A fresh one-slot error channel for a service.
pub fn error_signal() -> (ErrorReporter, ErrorSignal) {
    mpsc::channel(1)
}

/// The output of [`merge`].
#[derive(Debug)]
pub struct MergedErrorSignal {
    rx: mpsc::Receiver<ServiceError>,
    sources: usize,
}

impl MergedErrorSignal {
    /// How many input signals feed this one.
    pub fn sources(&self) -> usize {
        self.sources
    }

    /// Next error from any source, or `None` once every source has closed.
    pub async fn recv(&mut self) -> Option<ServiceError> {
        self.rx.recv().await
    }
}

/// Combine several error signals into one.
///
/// Absent signals (a service that was never launched) are skipped
/// entirely rather than being treated as already-closed inputs. Each
/// present signal gets a forwarding task; a closing task waits for all
/// forwarders and only then closes the output, so with no inputs the
/// output closes right away.
pub fn merge<I>(signals: I) -> MergedErrorSignal
where
    I: IntoIterator<Item = Option<ErrorSignal>>,
{
    let (out, rx) = mpsc::channel(1);
    let mut forwarders = JoinSet::new();

    for mut signal in signals.into_iter().flatten() {
        let out = out.clone();
        forwarders.spawn(async move {
            while let Some(err) = signal.recv().await {
                if out.send(err).await.is_err() {
                    // nobody is listening anymore
                    break;
                }
            }
        });
    }

    let sources = forwarders.len();
    tokio::spawn(async move {
        while forwarders.join_next().await.is_some() {}
        drop(out);
    });

    MergedErrorSignal { rx, sources }
}

/// Block until the first service error, which is returned, or until all
/// services have stopped cleanly.
pub async fn supervise(mut merged: MergedErrorSignal) -> Result<(), ServiceError> {
    tracing::debug!(sources = merged.sources(), "supervising services");
    match merged.recv().await {
        Some(err) => {
            tracing::error!(service = %err.service(), "service failed: {}", err);
            Err(err)
        }
        None => {
            tracing::info!("all services stopped without error");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use super::*;

    fn boom(service: &str) -> ServiceError {
        ServiceError::new(service, io::Error::other("boom"))
    }

    #[tokio::test]
    async fn test_merge_all_absent_closes_immediately() {
        let merged = merge([None, None]);
        assert_eq!(merged.sources(), 0);

        let result = tokio::time::timeout(Duration::from_secs(1), supervise(merged))
            .await
            .expect("merged signal should close without inputs");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_merge_empty_input() {
        let mut merged = merge(Vec::new());
        assert!(merged.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_merge_skips_absent_signals() {
        let (_api_tx, api) = error_signal();
        let merged = merge([Some(api), None]);
        assert_eq!(merged.sources(), 1);
    }

    #[tokio::test]
    async fn test_single_error_is_observed_regardless_of_order() {
        for failing in 0..3 {
            let mut reporters = Vec::new();
            let mut signals = Vec::new();
            for _ in 0..3 {
                let (tx, rx) = error_signal();
                reporters.push(tx);
                signals.push(Some(rx));
            }
            let merged = merge(signals);

            for (i, reporter) in reporters.into_iter().enumerate() {
                if i == failing {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        reporter.send(boom(&format!("svc-{}", i))).await.unwrap();
                    });
                } else {
                    drop(reporter);
                }
            }

            let err = tokio::time::timeout(Duration::from_secs(1), supervise(merged))
                .await
                .unwrap()
                .unwrap_err();
            assert_eq!(err.service(), format!("svc-{}", failing));
        }
    }

    #[tokio::test]
    async fn test_clean_close_of_every_source_ends_supervision() {
        let (api_tx, api) = error_signal();
        let (gw_tx, gw) = error_signal();
        let merged = merge([Some(api), Some(gw)]);

        drop(api_tx);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(gw_tx);
        });

        let result = tokio::time::timeout(Duration::from_secs(1), supervise(merged))
            .await
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_merged_stays_open_while_a_source_is_alive() {
        let (api_tx, api) = error_signal();
        let (_gw_tx, gw) = error_signal();
        let merged = merge([Some(api), Some(gw)]);
        drop(api_tx);

        let result = tokio::time::timeout(Duration::from_millis(50), supervise(merged)).await;
        assert!(result.is_err(), "supervision must wait for the live source");
    }
}
