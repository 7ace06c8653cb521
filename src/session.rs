//! A worker plus the proxy talking to it, and snapshot loading.

use std::path::Path;

use anyhow::{Context, Result, bail};
use heapscope_core::ExplorerConfig;
use heapscope_proxy::{LoaderProxy, RemoteCallProxy, SnapshotProxy};
use heapscope_worker::spawn_in_process;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Splits a byte stream into text chunks without cutting a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return the longest complete text available. An
    /// incomplete trailing sequence is held for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(bytes);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => bail!("snapshot is not valid UTF-8: {e}"),
        };
        let rest = self.pending.split_off(complete);
        let text = String::from_utf8(std::mem::replace(&mut self.pending, rest))
            .context("snapshot is not valid UTF-8")?;
        Ok(text)
    }

    /// Fail if the stream ended inside a sequence.
    pub fn finish(self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            bail!("snapshot ends inside a UTF-8 sequence")
        }
    }
}

/// One in-process worker for the lifetime of a command.
pub struct Session {
    proxy: RemoteCallProxy,
    config: ExplorerConfig,
    worker: JoinHandle<()>,
    probe: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

impl Session {
    pub fn start(config: ExplorerConfig) -> Self {
        let (client, worker) = spawn_in_process();
        let proxy = RemoteCallProxy::connect(client.channel, client.replies);
        let probe = proxy.spawn_probe(config.probe_interval());
        let monitor = spawn_monitor(&proxy);
        Self {
            proxy,
            config,
            worker,
            probe,
            monitor,
        }
    }

    pub const fn proxy(&self) -> &RemoteCallProxy {
        &self.proxy
    }

    pub const fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Stream a snapshot file into a new loader and build it.
    pub async fn load(&self, path: &Path) -> Result<SnapshotProxy> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open snapshot {}", path.display()))?;
        let loader = LoaderProxy::create(&self.proxy)?;
        let mut chunker = Utf8Chunker::new();
        let mut buffer = vec![0u8; self.config.load_chunk_size];
        let mut total = 0usize;

        loop {
            let read = file
                .read(&mut buffer)
                .await
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            if read == 0 {
                break;
            }
            total += read;
            let text = chunker.push(&buffer[..read])?;
            if !text.is_empty() {
                loader.write(&text)?;
            }
        }
        chunker.finish()?;
        debug!(bytes = total, path = %path.display(), "Snapshot streamed");

        let snapshot = loader
            .build_snapshot()
            .await
            .with_context(|| format!("Failed to build snapshot {}", path.display()))?;
        info!(path = %path.display(), nodes = snapshot.node_count().await?, "Snapshot loaded");
        Ok(snapshot)
    }

    pub fn shutdown(self) {
        self.monitor.abort();
        self.probe.abort();
        drop(self.proxy);
        if !self.worker.is_finished() {
            debug!("Worker still draining at shutdown");
        }
    }
}

/// Log worker progress and long-running-call warnings.
fn spawn_monitor(proxy: &RemoteCallProxy) -> JoinHandle<()> {
    let mut events = proxy.subscribe_events();
    let mut busy = proxy.busy();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => match event.data.decode::<String>() {
                        Ok(message) => info!(event = %event.name, "{message}"),
                        Err(_) => debug!(event = %event.name, "Worker event"),
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Missed worker events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                changed = busy.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *busy.borrow_and_update() {
                        warn!("Worker is still working on a long-running call");
                    }
                }
            }
        }
    })
}
