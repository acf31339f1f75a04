//! Tails the install log written by the provisioning script.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Polls the log file from the last known byte offset and forwards complete
/// lines to a channel. Transient read errors are tolerated; the loop exits
/// when the cancellation signal flips.
pub struct LogWatcher {
    path: PathBuf,
    interval: Duration,
}

impl LogWatcher {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            interval: Duration::from_millis(500),
        }
    }

    /// Shorter poll interval, used by tests.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn watch(self, lines: mpsc::UnboundedSender<String>, mut cancel: watch::Receiver<bool>) {
        // Give the script a moment to create the file.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut offset: u64 = 0;
        let mut partial = String::new();

        loop {
            let cancelled = *cancel.borrow();

            match self.read_from(offset).await {
                Ok((chunk, new_offset)) => {
                    offset = new_offset;
                    partial.push_str(&chunk);
                    while let Some(newline) = partial.find('\n') {
                        let line = partial[..newline].trim_end_matches('\r').to_string();
                        partial.drain(..=newline);
                        if lines.send(line).is_err() {
                            return;
                        }
                    }
                }
                // The file may not exist yet or may be locked by the script.
                Err(e) => debug!("install log not readable yet: {e}"),
            }

            // One last read happens after cancellation so the script's final
            // lines are not lost to the poll interval.
            if cancelled {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.changed() => {}
            }
        }

        // Flush a trailing unterminated line on shutdown.
        if !partial.is_empty() {
            let _ = lines.send(partial);
        }
    }

    async fn read_from(&self, offset: u64) -> std::io::Result<(String, u64)> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        if len <= offset {
            return Ok((String::new(), offset));
        }
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buffer = String::new();
        file.read_to_string(&mut buffer).await?;
        Ok((buffer, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn picks_up_appended_lines_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("install.log");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let watcher = LogWatcher::new(log_path.clone()).with_interval(Duration::from_millis(20));
        let task = tokio::spawn(watcher.watch(tx, cancel_rx));

        tokio::fs::write(&log_path, "first line\n").await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, "first line");

        // Appending resumes from the previous offset.
        let mut existing = tokio::fs::read(&log_path).await.unwrap();
        existing.extend_from_slice(b"second line\n");
        tokio::fs::write(&log_path, existing).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, "second line");

        cancel_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("never-created.log");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let watcher = LogWatcher::new(log_path).with_interval(Duration::from_millis(20));
        let task = tokio::spawn(watcher.watch(tx, cancel_rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(rx.recv().await.is_none());
    }
}
