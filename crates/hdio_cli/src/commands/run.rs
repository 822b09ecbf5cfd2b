//! Run command implementation.
//!
//! Drives a sync worker from JSON-lines messages on stdin, the same
//! `props`/`html` messages an embedding host would post.

use hdio_sync_engine::{
    spawn_worker, Identity, ReqwestClient, WorkerConfig, WorkerEvent, WorkerHandle, WorkerMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Options for the run command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Identity to start with, if complete.
    pub identity: Identity,
    /// Producer debounce window.
    pub debounce: Duration,
    /// Request timeout.
    pub timeout: Duration,
}

/// Runs the worker until stdin closes or Ctrl-C.
pub fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(drive(options))
}

async fn drive(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = WorkerConfig::new()
        .with_debounce(options.debounce)
        .with_timeout(options.timeout);
    let http = Arc::new(ReqwestClient::new(options.timeout)?);
    let handle = spawn_worker(config, http);

    let mut events = handle.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            report(&event);
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    feed(handle, options.identity, stdin).await?;
    let _ = reporter.await;
    Ok(())
}

/// Feeds JSON-lines messages from `input` to the worker, then stops it.
///
/// A startup identity with a tenant is sent before anything is read.
/// Identity lines go straight to the worker, after any markup still waiting
/// in its debounce window, so messages keep their input order; only markup
/// snapshots are debounced. On EOF the worker drains; on Ctrl-C it is shut
/// down.
pub async fn feed<R>(
    handle: WorkerHandle,
    identity: Identity,
    input: R,
) -> Result<(), Box<dyn std::error::Error>>
where
    R: AsyncBufRead + Unpin,
{
    if !identity.tenant.is_empty() {
        handle.send(WorkerMessage::props(identity)).await?;
    }
    let mut html = handle.debouncer();

    let mut lines = input.lines();
    let interrupted = loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break true,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break false;
        };
        if line.trim().is_empty() {
            continue;
        }
        match WorkerMessage::from_json(&line) {
            Ok(message @ WorkerMessage::Props(_)) => {
                // Markup still in its window belongs to the old identity.
                html.finish().await;
                handle.send(message).await?;
                html = handle.debouncer();
            }
            Ok(message @ WorkerMessage::Html(_)) => {
                html.push(message);
            }
            Err(e) => warn!(error = %e, "skipping message"),
        }
    };

    if interrupted {
        info!("interrupted, stopping worker");
        handle.shutdown().await;
    } else {
        html.finish().await;
        handle.join().await;
    }
    Ok(())
}

fn report(event: &WorkerEvent) {
    match event {
        WorkerEvent::SessionStarted { tenant, state } => {
            info!(%tenant, ?state, "session started");
        }
        WorkerEvent::Resolved {
            pass,
            added,
            pending,
            errors,
        } => {
            info!(pass, added, pending, errors = errors.len(), "pass complete");
            for e in errors {
                warn!(error = %e, "entity skipped");
            }
        }
        WorkerEvent::Uploaded(receipt) => {
            info!(
                request_id = %receipt.request_id,
                entries = receipt.entries,
                bytes = receipt.bytes,
                "batch uploaded"
            );
        }
        WorkerEvent::Failed(e) => error!(error = %e, "sync failed"),
    }
}
