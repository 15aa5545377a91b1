//! Per-machine console logs.
//!
//! Every machine gets one log file that collects its stdout and stderr. Once the file grows
//! past its maximum size it is renamed to `<name>.old` (replacing any previous one) and a
//! fresh file is started, so at most two files exist per machine.

use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A size-bounded log file fed through a channel.
///
/// Writes are queued and performed by a background task, so producers never block on disk.
/// The task drains the queue and exits once the log and every pipe are dropped.
///
/// ## Examples
///
/// ```no_run
/// use monofleet::log::MachineLog;
///
/// # async fn example() -> std::io::Result<()> {
/// let log = MachineLog::new("/tmp/m1.log", Some(1024 * 1024)).await?;
/// let mut child = tokio::process::Command::new("echo")
///     .arg("hello")
///     .stdout(std::process::Stdio::piped())
///     .spawn()?;
/// if let Some(stdout) = child.stdout.take() {
///     log.pipe(stdout);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MachineLog {
    path: PathBuf,
    tx: UnboundedSender<Vec<u8>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MachineLog {
    /// Default maximum log file size (10MB).
    pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

    /// Opens (or creates) the log file at `path`, creating missing parent directories.
    pub async fn new(path: impl AsRef<Path>, max_size: Option<u64>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let size = file.metadata().await?.len();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(write_queued(
            rx,
            file,
            path.clone(),
            max_size.unwrap_or(Self::DEFAULT_MAX_SIZE),
            size,
        ));

        Ok(Self { path, tx })
    }

    /// Copies `reader` into the log line by line until it reaches end of file.
    pub fn pipe<R>(&self, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader);
            let mut line = Vec::new();
            loop {
                line.clear();
                match lines.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "machine output stream failed");
                        break;
                    }
                }
            }
        })
    }

    /// The path of the current log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn rotate(path: &Path) -> io::Result<File> {
    let mut old = path.as_os_str().to_owned();
    old.push(".old");

    if fs::try_exists(&old).await? {
        fs::remove_file(&old).await?;
    }

    fs::rename(path, &old).await?;

    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
}

async fn write_queued(
    mut rx: UnboundedReceiver<Vec<u8>>,
    mut file: File,
    path: PathBuf,
    max_size: u64,
    mut size: u64,
) {
    while let Some(data) = rx.recv().await {
        let len = data.len() as u64;

        if size > 0 && size + len > max_size {
            let _ = file.flush().await;
            match rotate(&path).await {
                Ok(new_file) => {
                    file = new_file;
                    size = 0;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to rotate machine log");
                }
            }
        }

        match file.write_all(&data).await {
            Ok(()) => size += len,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to write machine log");
            }
        }
    }

    let _ = file.flush().await;
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_machine_log_pipes_reader_into_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested/m1.log");
        let log = MachineLog::new(&path, None).await?;

        let handle = log.pipe(&b"booting\nready\n"[..]);
        handle.await?;
        settle().await;

        assert_eq!(fs::read_to_string(&path).await?, "booting\nready\n");
        assert_eq!(log.path(), path);

        Ok(())
    }

    #[tokio::test]
    async fn test_machine_log_rotates_when_full() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("m1.log");
        let log = MachineLog::new(&path, Some(11)).await?;

        log.pipe(&b"0123456789\nabcdef\n"[..]).await?;
        settle().await;

        assert_eq!(fs::read_to_string(&path).await?, "abcdef\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("m1.log.old")).await?,
            "0123456789\n"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_machine_log_appends_to_existing_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("m1.log");
        fs::write(&path, "before\n").await?;

        let log = MachineLog::new(&path, None).await?;
        log.pipe(&b"after\n"[..]).await?;
        settle().await;

        assert_eq!(fs::read_to_string(&path).await?, "before\nafter\n");

        Ok(())
    }
}
