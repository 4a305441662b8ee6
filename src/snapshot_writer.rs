// One collection cycle: time, show, durable append, then flush.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use crate::bucket::{DEFAULT_FILE_PREFIX, TimeBucket};
use crate::channel::{ChannelClient, Command};
use crate::error::{Result, StatError};
use crate::models::Snapshot;

pub struct SnapshotWriter {
    client: ChannelClient,
    base_dir: PathBuf,
    file_prefix: String,
}

impl SnapshotWriter {
    pub fn new(client: ChannelClient, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            base_dir: base_dir.into(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Collects the daemon's counters into the file for `bucket` and returns its path.
    ///
    /// `flush` is only sent after the record has been written and synced; any
    /// earlier failure ends the cycle with the daemon's counters untouched.
    #[instrument(skip(self), fields(operation = "collect", base_dir = %self.base_dir.display()))]
    pub async fn collect(&self, bucket: TimeBucket) -> Result<PathBuf> {
        let dir = bucket.dir_path(&self.base_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StatError::storage(&dir, e))?;

        let last_flush = self.client.execute_text(Command::Time).await?;
        let counters = self.client.execute(Command::Show.as_str()).await?;

        let path = dir.join(bucket.file_name(&self.file_prefix));
        let record = Snapshot::render_record(&last_flush, &counters);
        append_durably(&path, &record).await?;
        info!(
            path = %path.display(),
            bytes = counters.len(),
            "snapshot written"
        );

        self.client.execute(Command::Flush.as_str()).await?;
        info!("daemon counters flushed");
        Ok(path)
    }
}

async fn append_durably(path: &Path, record: &[u8]) -> Result<()> {
    let storage = |e: std::io::Error| StatError::storage(path, e);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(storage)?;
    file.write_all(record).await.map_err(storage)?;
    file.sync_all().await.map_err(storage)?;
    Ok(())
}
