pub mod doctor;

use anyhow::{Context, Result};
use fleet_core::{EventSink, FleetError, ViolationEvent};
use fleet_proto::event::EventRecord;
use fleet_proto::topic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt, sync::mpsc};
use tracing::{debug, info, warn};

/// Upper bound on records written per spool file.
const MAX_BATCH: usize = 256;

/// One outbound line: the topic it would be published on and the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub event: EventRecord,
}

impl Envelope {
    pub fn new(prefix: &str, event: EventRecord) -> Self {
        Self { topic: topic::event_topic(prefix, event.event_type), event }
    }
}

/// Hands events to an async writer without blocking the caller.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    prefix: String,
    tx: mpsc::Sender<Envelope>,
}

pub fn channel(prefix: &str, capacity: usize) -> (ChannelSink, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink { prefix: prefix.to_string(), tx }, rx)
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &ViolationEvent) -> Result<(), FleetError> {
        let env = Envelope::new(&self.prefix, event.to_record());
        self.tx.try_send(env).map_err(|e| match e {
            mpsc::error::TrySendError::Full(env) => FleetError::Sink(format!("queue full, dropped {}", env.event.id)),
            mpsc::error::TrySendError::Closed(_) => FleetError::Sink("writer gone".into()),
        })
    }
}

/// Collects whatever is queued behind `first`, up to `MAX_BATCH`.
fn batch(first: Envelope, rx: &mut mpsc::Receiver<Envelope>) -> Vec<Envelope> {
    let mut out = vec![first];
    while out.len() < MAX_BATCH {
        match rx.try_recv() {
            Ok(env) => out.push(env),
            Err(_) => break,
        }
    }
    out
}

fn to_ndjson(batch: &[Envelope]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for env in batch {
        serde_json::to_writer(&mut buf, env)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Spool of JSON-lines files, one per batch. Oldest files go first when the
/// directory outgrows its cap.
pub struct SpoolWriter {
    spool_dir: String,
    spool_max_bytes: u64,
}

impl SpoolWriter {
    pub fn new(spool_dir: String, spool_max_mb: u64) -> Self {
        Self { spool_dir, spool_max_bytes: spool_max_mb * 1024 * 1024 }
    }

    pub async fn write_batch(&self, batch: &[Envelope]) -> Result<PathBuf> {
        fs::create_dir_all(&self.spool_dir).await.with_context(|| format!("create spool dir {}", self.spool_dir))?;
        let name = PathBuf::from(format!(
            "{}/{}.ndjson",
            self.spool_dir,
            time::OffsetDateTime::now_utc().unix_timestamp_nanos()
        ));
        let mut f = fs::File::create(&name).await.with_context(|| format!("create {}", name.display()))?;
        f.write_all(&to_ndjson(batch)?).await?;
        f.flush().await?;
        Ok(name)
    }

    /// Deletes the oldest spool files until the directory fits the cap.
    pub async fn prune(&self) -> Result<usize> {
        let dir = Path::new(&self.spool_dir);
        if !dir.exists() {
            return Ok(0);
        }
        let mut files = Vec::new();
        let mut total = 0u64;
        let mut entries = fs::read_dir(dir).await?;
        while let Some(ent) = entries.next_entry().await? {
            let path = ent.path();
            if path.extension().map_or(true, |e| e != "ndjson") { continue; }
            let len = ent.metadata().await?.len();
            total += len;
            files.push((path, len));
        }
        // names are nanosecond timestamps
        files.sort();
        let mut removed = 0;
        for (path, len) in files {
            if total <= self.spool_max_bytes { break; }
            fs::remove_file(&path).await.with_context(|| format!("remove {}", path.display()))?;
            total -= len;
            removed += 1;
        }
        if removed > 0 {
            warn!("spool: over {} bytes, removed {} oldest files", self.spool_max_bytes, removed);
        }
        Ok(removed)
    }

    /// Runs until every sender is gone. Returns the number of records written.
    pub async fn run(self, mut rx: mpsc::Receiver<Envelope>) -> u64 {
        let mut written = 0u64;
        while let Some(first) = rx.recv().await {
            let batch = batch(first, &mut rx);
            match self.write_batch(&batch).await {
                Ok(path) => {
                    written += batch.len() as u64;
                    debug!("spool: {} records -> {}", batch.len(), path.display());
                }
                Err(e) => warn!("spool: write failed, {} records lost: {:#}", batch.len(), e),
            }
            if let Err(e) = self.prune().await {
                warn!("spool: prune failed: {:#}", e);
            }
        }
        info!("spool: writer stopped after {} records", written);
        written
    }
}

/// Writes one JSON line per event to stdout.
pub struct StdoutWriter;

impl StdoutWriter {
    pub async fn run(self, mut rx: mpsc::Receiver<Envelope>) -> u64 {
        let mut out = tokio::io::stdout();
        let mut written = 0u64;
        while let Some(first) = rx.recv().await {
            let batch = batch(first, &mut rx);
            let res = async {
                out.write_all(&to_ndjson(&batch)?).await?;
                out.flush().await?;
                Ok::<(), anyhow::Error>(())
            }.await;
            match res {
                Ok(()) => written += batch.len() as u64,
                Err(e) => warn!("stdout sink: {:#}", e),
            }
        }
        written
    }
}
