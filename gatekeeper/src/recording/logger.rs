use super::types::RecordedEvent;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Appends recorded events to a JSONL file from a background task.
#[derive(Clone)]
pub struct RecordingLogger {
    sender: mpsc::UnboundedSender<Command>,
}

enum Command {
    Record(Box<RecordedEvent>),
    Flush(oneshot::Sender<()>),
}

impl RecordingLogger {
    pub fn new(log_file_path: PathBuf) -> Result<(Self, JoinHandle<()>)> {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            if let Err(e) = Self::writer_task(&log_file_path, &mut receiver).await {
                error!("Recording logger failed: {}", e);
            }
        });

        Ok((Self { sender }, handle))
    }

    pub fn record(&self, event: RecordedEvent) {
        if self.sender.send(Command::Record(Box::new(event))).is_err() {
            error!("Failed to send event to recording logger: receiver dropped");
        }
    }

    /// Wait until everything recorded so far is on disk.
    ///
    /// A one-shot run exits right after its last request, so it must flush
    /// before returning or the tail of the recording is lost.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Command::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    async fn writer_task(
        log_file_path: &Path,
        receiver: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Result<()> {
        if let Some(parent) = log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)
            .await?;

        info!("Recording forge traffic to: {:?}", log_file_path);

        while let Some(command) = receiver.recv().await {
            match command {
                Command::Record(event) => match serde_json::to_string(&event) {
                    Ok(json_line) => {
                        if let Err(e) = file.write_all(format!("{}\n", json_line).as_bytes()).await
                        {
                            error!("Failed to write event to log: {}", e);
                        }
                    }
                    Err(e) => error!("Failed to serialize event: {}", e),
                },
                Command::Flush(done) => {
                    if let Err(e) = file.flush().await {
                        error!("Failed to flush log file: {}", e);
                    }
                    let _ = done.send(());
                }
            }
        }

        file.flush().await?;
        info!("Recording writer task shutting down");
        Ok(())
    }
}
