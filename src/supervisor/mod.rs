//! The Supervisor module manages the lifecycle of the Herald application.
//!
//! The supervisor is the top-level owner of the running services: the
//! [`Dispatcher`], the optional reader feeding alerts into the alert source,
//! and the signal handler.
//!
//! ## Responsibilities
//!
//! - **Initialization**: The `SupervisorBuilder` wires the alert source, the
//!   routing tree, the notification stage and the group marker into a
//!   dispatcher configured from the `AppConfig`.
//! - **Retention**: With an alert input, resolved alerts are periodically
//!   dropped from the in-memory alert source.
//! - **Graceful Shutdown**: It listens for `SIGINT` and `SIGTERM`, stops the
//!   dispatcher and waits up to `shutdown_timeout` for every task to finish.
//! - **Task Supervision**: If a supervised task panics, every other task is
//!   shut down as well.

mod builder;

use std::sync::Arc;

pub use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::{io::AsyncBufRead, signal, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    engine::{Dispatcher, RouteConfigError},
    providers::{MemoryAlertSource, forward_json_lines},
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// Neither an alert source nor an input was provided to the
    /// `SupervisorBuilder`.
    #[error("Missing alert source for Supervisor")]
    MissingAlertSource,

    /// A routing tree was not provided to the `SupervisorBuilder`.
    #[error("Missing routing tree for Supervisor")]
    MissingRoutingTree,

    /// A notification stage was not provided to the `SupervisorBuilder`.
    #[error("Missing notification stage for Supervisor")]
    MissingNotificationStage,

    /// The routing tree could not be loaded.
    #[error("Failed to load routing tree: {0}")]
    RouteConfig(#[from] RouteConfigError),

    /// The dispatcher metrics could not be created or registered.
    #[error("Failed to set up metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// A line-oriented reader of JSON encoded alerts.
pub type AlertInput = Box<dyn AsyncBufRead + Send + Unpin>;

/// The primary runtime manager for the application.
pub struct Supervisor {
    /// Shared application configuration.
    config: Arc<AppConfig>,

    /// The dispatcher grouping and notifying alerts.
    dispatcher: Arc<Dispatcher>,

    /// A reader feeding the in-memory alert source, if any.
    input: Option<(AlertInput, Arc<MemoryAlertSource>)>,

    /// A token used to signal a graceful shutdown to all supervised tasks.
    cancellation_token: CancellationToken,

    /// A set of all spawned tasks that the supervisor is actively managing.
    join_set: JoinSet<()>,
}

impl Supervisor {
    /// Creates a new Supervisor instance. The dispatcher must be tied to
    /// `cancellation_token`.
    pub fn new(
        config: AppConfig,
        dispatcher: Arc<Dispatcher>,
        input: Option<(AlertInput, Arc<MemoryAlertSource>)>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            input,
            cancellation_token,
            join_set: JoinSet::new(),
        }
    }

    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// The dispatcher run by this supervisor.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// A token that shuts the supervisor down when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Starts the supervised services and blocks until shutdown.
    ///
    /// Shutdown is initiated by `SIGINT`, `SIGTERM`, cancellation of the
    /// supervisor's token, or a panicking task.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let signal_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            tokio::select! {
                _ = shutdown_signal() => signal_token.cancel(),
                _ = signal_token.cancelled() => {}
            }
        });

        let dispatcher = Arc::clone(&self.dispatcher);
        self.join_set.spawn(async move {
            dispatcher.run().await;
        });

        if let Some((input, source)) = self.input.take() {
            let gc_source = Arc::clone(&source);
            let gc_interval = self.config.alert_gc_interval;
            let gc_token = self.cancellation_token.clone();
            self.join_set.spawn(async move {
                gc_source.run_gc(gc_interval, gc_token).await;
            });

            let input_token = self.cancellation_token.clone();
            self.join_set.spawn(async move {
                if let Err(e) = forward_json_lines(input, &source, input_token).await {
                    tracing::error!(error = %e, "Alert input failed.");
                }
            });
        }

        tracing::info!(routes = %self.config.routes_config_path.display(), "Supervisor started.");

        loop {
            tokio::select! {
                maybe_result = self.join_set.join_next() => {
                    match maybe_result {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "A critical task failed. Initiating shutdown.");
                            self.cancellation_token.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.cancellation_token.cancelled() => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        let stats = self.dispatcher.stats().await;
        tracing::info!(
            total_groups = stats.total_groups,
            routes_with_groups = stats.routes_with_groups,
            "Shutting down dispatcher."
        );

        self.cancellation_token.cancel();
        let shutdown_timeout = self.config.shutdown_timeout;
        let dispatcher = Arc::clone(&self.dispatcher);
        let join_set = &mut self.join_set;
        let drain = async move {
            dispatcher.stop().await;
            while join_set.join_next().await.is_some() {}
        };

        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            tracing::warn!(
                ?shutdown_timeout,
                "Supervised tasks did not complete within the timeout. Aborting them."
            );
            self.join_set.shutdown().await;
        }

        tracing::info!("Supervisor shutdown complete.");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
        _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
    }
}
