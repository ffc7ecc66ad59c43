use super::*;
use notify_debouncer_full::{
    DebouncedEvent, new_debouncer,
    notify::{EventKind, RecursiveMode, event::CreateKind},
};

impl Cla {
    /// Spawns the watcher/forwarder task pair for the outbox directory: one
    /// task watches for newly created files, the other reads and dispatches
    /// each one to `sink`, deleting it afterward.
    pub async fn start_watcher(&self, sink: Arc<dyn hardy_bpa::cla::Sink>, outbox: String) {
        let (path_tx, path_rx) = flume::unbounded::<PathBuf>();

        let cancel = self.tasks.cancel_token().clone();
        self.tasks.spawn(async move { watcher_task(outbox, path_tx, cancel).await });

        let cancel = self.tasks.cancel_token().clone();
        self.tasks.spawn(async move { forwarder_task(sink, path_rx, cancel).await });
    }
}

async fn watcher_task(outbox: String, path_tx: flume::Sender<PathBuf>, cancel: tokio_util::sync::CancellationToken) {
    let (tx, rx) = flume::unbounded();
    let Ok(mut debouncer) = new_debouncer(std::time::Duration::from_secs(1), None, move |res| match res {
        Ok(events) => {
            for e in events {
                if tx.send(e).is_err() {
                    break;
                }
            }
        }
        Err(errors) => {
            for e in errors {
                tracing::error!("watch error: {e}");
            }
        }
    }) else {
        tracing::error!("failed to create directory watcher for '{outbox}'");
        return;
    };

    if debouncer.watch(&outbox, RecursiveMode::NonRecursive).is_err() {
        tracing::error!("failed to watch '{outbox}'");
        return;
    }

    tracing::info!("watching '{outbox}' for new files");

    loop {
        tokio::select! {
            res = rx.recv_async() => match res {
                Err(_) => break,
                Ok(DebouncedEvent { event, .. }) => {
                    if event.kind == EventKind::Create(CreateKind::File) {
                        for path in event.paths {
                            if path_tx.send_async(path).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            },
            _ = cancel.cancelled() => break,
        }
    }
}

async fn forwarder_task(
    sink: Arc<dyn hardy_bpa::cla::Sink>,
    rx: flume::Receiver<PathBuf>,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            res = rx.recv_async() => match res {
                Err(_) => break,
                Ok(path) => {
                    match tokio::fs::read(&path).await {
                        Ok(buffer) => {
                            if let Err(e) = sink.dispatch(buffer.into()).await {
                                tracing::warn!("failed to dispatch bundle: {e}");
                            }
                        }
                        Err(e) => tracing::error!("failed to read from '{}': {e}", path.display()),
                    }
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        tracing::warn!("failed to remove file '{}': {e}", path.display());
                    }
                }
            },
            _ = cancel.cancelled() => break,
        }
    }
}
