// src/engine/supervisor.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::engine::queue::WorkQueue;
use crate::engine::report::{ReportSink, SupervisorEvent};
use crate::engine::root_task::{RootContext, queue_rescan, supervise_root};
use crate::errors::{CodesyncError, Result};
use crate::exec::{SyncExecutor, spawn_workers};
use crate::fs::FileSystem;
use crate::reconcile::{ReconcileSummary, Reconciler};
use crate::types::WatchRoot;
use crate::watch::WatchSource;

/// Resolve once shutdown has been requested (or the handle side is gone).
pub(crate) async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Cloneable handle used by signal glue and tests to stop a running
/// supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl SupervisorHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Owns the lifecycle of every root task, the worker pool and the queue.
pub struct Supervisor {
    config: SyncConfig,
    roots: Vec<Arc<WatchRoot>>,
    fs: Arc<dyn FileSystem>,
    source: Arc<dyn WatchSource>,
    sink: Arc<dyn ReportSink>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("roots", &self.roots.iter().map(|r| &r.id).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(
        config: SyncConfig,
        fs: Arc<dyn FileSystem>,
        source: Arc<dyn WatchSource>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let roots = config.roots.iter().cloned().map(Arc::new).collect();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            roots,
            fs,
            source,
            sink,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    fn executor(&self) -> Arc<SyncExecutor> {
        let options = &self.config.options;
        Arc::new(SyncExecutor::new(
            Arc::clone(&self.fs),
            self.roots.iter().cloned(),
            options.retry,
            options.checksum,
        ))
    }

    /// An unreadable root is the one startup error that is fatal.
    pub fn check_roots(&self) -> Result<()> {
        for root in &self.roots {
            match self.fs.metadata(&root.path) {
                Ok(Some(meta)) if meta.is_dir() => {}
                Ok(Some(_)) => {
                    return Err(CodesyncError::ConfigError(format!(
                        "watch root '{}' at {:?} is not a directory",
                        root.id, root.path
                    )));
                }
                Ok(None) => {
                    return Err(CodesyncError::ConfigError(format!(
                        "watch root '{}' at {:?} does not exist",
                        root.id, root.path
                    )));
                }
                Err(err) => {
                    return Err(CodesyncError::ConfigError(format!(
                        "watch root '{}' at {:?} is unreadable: {:#}",
                        root.id, root.path, err
                    )));
                }
            }
        }
        Ok(())
    }

    async fn reconcile_all(&self, reconciler: &Reconciler) -> Result<Vec<ReconcileSummary>> {
        let mut summaries = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let reconciler = reconciler.clone();
            let root = Arc::clone(root);
            let summary = tokio::task::spawn_blocking(move || reconciler.reconcile(&root))
                .await
                .map_err(|err| anyhow::anyhow!("reconcile task died: {}", err))?;
            self.sink
                .record(SupervisorEvent::ReconcileSummary(summary.clone()));
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Reconcile every root once and return the summaries (`--once`).
    pub async fn reconcile_once(&self) -> Result<Vec<ReconcileSummary>> {
        self.check_roots()?;
        let reconciler = Reconciler::new(self.executor());
        self.reconcile_all(&reconciler).await
    }

    /// Run until [`SupervisorHandle::shutdown`] is called.
    ///
    /// Startup reconciles every root before any watch attaches. On shutdown
    /// the root tasks stop reading events and force-close their pending
    /// windows, then the workers get `shutdown_grace` to drain the queue.
    pub async fn run(self) -> Result<()> {
        self.check_roots()?;
        let options = self.config.options.clone();

        let executor = self.executor();
        let reconciler = Reconciler::new(Arc::clone(&executor));
        self.reconcile_all(&reconciler).await?;

        let queue = Arc::new(WorkQueue::new(options.queue_capacity));
        let workers = spawn_workers(
            options.workers,
            Arc::clone(&queue),
            Arc::clone(&executor),
            Arc::clone(&self.sink),
        );

        let contexts: Vec<RootContext> = self
            .roots
            .iter()
            .map(|root| RootContext {
                root: Arc::clone(root),
                source: Arc::clone(&self.source),
                fs: Arc::clone(&self.fs),
                queue: Arc::clone(&queue),
                reconciler: reconciler.clone(),
                sink: Arc::clone(&self.sink),
                debounce: options.debounce,
                rename_window: options.rename_window,
                restart_backoff: options.restart_backoff,
                restart_backoff_max: options.restart_backoff_max,
            })
            .collect();

        let root_tasks: Vec<JoinHandle<()>> = contexts
            .iter()
            .cloned()
            .map(|ctx| tokio::spawn(supervise_root(ctx, self.shutdown_tx.subscribe())))
            .collect();

        let periodic = options.reconcile_interval.map(|every| {
            tokio::spawn(periodic_reconcile(
                contexts.clone(),
                every,
                self.shutdown_tx.subscribe(),
            ))
        });

        info!(roots = self.roots.len(), workers = options.workers, "supervisor running");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        wait_shutdown(&mut shutdown_rx).await;
        info!("shutdown requested, draining");

        for task in root_tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "root task ended abnormally");
            }
        }
        if let Some(periodic) = periodic {
            periodic.abort();
        }

        queue.close();
        let drain = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        match tokio::time::timeout(options.shutdown_grace, drain).await {
            Ok(()) => info!("work queue drained"),
            Err(_) => warn!(
                remaining = queue.len(),
                "shutdown grace period elapsed with work outstanding"
            ),
        }

        info!("supervisor stopped");
        Ok(())
    }
}

async fn periodic_reconcile(
    contexts: Vec<RootContext>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for ctx in &contexts {
                    debug!(root = %ctx.root.id, "periodic reconcile");
                    queue_rescan(ctx);
                }
            }
            _ = wait_shutdown(&mut shutdown) => break,
        }
    }
}
