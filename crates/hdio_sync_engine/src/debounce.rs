//! Producer-side coalescing of bursty updates.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Collapses bursts of values into one.
///
/// Every pushed value restarts the window. When the window elapses with no
/// further pushes, the most recent value is forwarded to the sink; the
/// earlier ones are dropped. Dropping or finishing the debouncer flushes a
/// value still waiting for its window.
#[derive(Debug)]
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawns a debouncer forwarding to `sink`.
    pub fn spawn(window: Duration, sink: mpsc::Sender<T>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(window, rx, sink));
        Self { tx, task }
    }

    /// Pushes a value. Returns false if the sink has gone away.
    pub fn push(&self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Flushes any pending value and waits for it to be forwarded.
    pub async fn finish(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

async fn run<T>(window: Duration, mut rx: mpsc::UnboundedReceiver<T>, sink: mpsc::Sender<T>) {
    while let Some(mut latest) = rx.recv().await {
        let mut closed = false;
        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(value) => latest = value,
                    None => {
                        closed = true;
                        break;
                    }
                },
                _ = tokio::time::sleep(window) => break,
            }
        }
        if sink.send(latest).await.is_err() || closed {
            return;
        }
    }
}
