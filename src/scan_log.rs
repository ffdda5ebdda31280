use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use eyre::WrapErr;
use tokio::io::AsyncWriteExt;

/// Payloads already seen by this process.
#[derive(Debug, Default, Clone)]
pub(crate) struct SeenSet {
    payloads: HashSet<String>,
}

impl SeenSet {
    /// Insert the payload, returning true if it had not been seen before.
    pub(crate) fn observe(&mut self, payload: &str) -> bool {
        if self.contains(payload) {
            return false;
        }

        self.payloads.insert(payload.to_string())
    }

    /// Undo an observation so the payload is treated as new again.
    pub(crate) fn forget(&mut self, payload: &str) {
        self.payloads.remove(payload);
    }

    pub(crate) fn contains(&self, payload: &str) -> bool {
        self.payloads.contains(payload)
    }

    pub(crate) fn len(&self) -> usize {
        self.payloads.len()
    }
}

impl FromIterator<String> for SeenSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            payloads: iter.into_iter().collect(),
        }
    }
}

/// Append-only text file with one payload per line.
#[derive(Debug, Clone)]
pub(crate) struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub(crate) async fn append(&self, payload: &str) -> eyre::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .wrap_err_with(|| format!("could not open {}", self.path.display()))?;

        let mut line = String::with_capacity(payload.len() + 1);
        line.push_str(payload);
        line.push('\n');

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Every payload in the file, in order. A missing file has none.
    pub(crate) async fn read_payloads(&self) -> eyre::Result<Vec<String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("could not read {}", self.path.display()))
            }
        };

        Ok(contents.lines().map(str::to_string).collect())
    }
}

/// The seen set and its backing log, built once at startup.
#[derive(Debug)]
pub(crate) struct ScanLog {
    pub(crate) seen: SeenSet,
    pub(crate) file: LogFile,
}

impl ScanLog {
    /// With `preload` the seen set starts out with everything already in the
    /// log, so payloads are not logged again after a restart.
    pub(crate) async fn open(path: impl Into<PathBuf>, preload: bool) -> eyre::Result<Self> {
        let file = LogFile::new(path);

        let seen = if preload {
            let seen: SeenSet = file.read_payloads().await?.into_iter().collect();
            tracing::info!(
                path = %file.path().display(),
                count = seen.len(),
                "preloaded previously logged payloads"
            );
            seen
        } else {
            SeenSet::default()
        };

        Ok(Self { seen, file })
    }

    /// Append a payload to the log file, forgetting it again on failure so
    /// that its next sighting retries the write.
    pub(crate) async fn record(&mut self, payload: &str) -> eyre::Result<()> {
        if let Err(err) = self.file.append(payload).await {
            self.seen.forget(payload);
            return Err(err);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_reports_new_payloads_once() {
        let mut seen = SeenSet::default();

        assert!(seen.observe("HELLO"));
        assert!(!seen.observe("HELLO"));
        assert!(seen.observe("WORLD"));
        assert_eq!(seen.len(), 2);

        seen.forget("HELLO");
        assert!(!seen.contains("HELLO"));
        assert!(seen.observe("HELLO"));
    }

    #[tokio::test]
    async fn appends_one_line_per_payload() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::new(dir.path().join("scanned_qr_codes.txt"));

        log.append("A").await.unwrap();
        log.append("B").await.unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "A\nB\n");
        assert_eq!(log.read_payloads().await.unwrap(), ["A", "B"]);
    }

    #[tokio::test]
    async fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::new(dir.path().join("missing.txt"));

        assert!(log.read_payloads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restart_without_preload_forgets_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanned_qr_codes.txt");
        std::fs::write(&path, "HELLO\n").unwrap();

        let mut log = ScanLog::open(&path, false).await.unwrap();

        assert!(log.seen.observe("HELLO"));
    }

    #[tokio::test]
    async fn restart_with_preload_remembers_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanned_qr_codes.txt");
        std::fs::write(&path, "HELLO\nWORLD\n").unwrap();

        let mut log = ScanLog::open(&path, true).await.unwrap();

        assert!(!log.seen.observe("HELLO"));
        assert!(!log.seen.observe("WORLD"));
        assert!(log.seen.observe("NEW"));

        log.record("NEW").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "HELLO\nWORLD\nNEW\n"
        );
    }

    #[tokio::test]
    async fn failed_record_forgets_payload() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ScanLog::open(dir.path().join("missing-dir").join("log.txt"), false)
            .await
            .unwrap();

        assert!(log.seen.observe("A"));
        assert!(log.record("A").await.is_err());
        assert!(!log.seen.contains("A"));
    }
}
