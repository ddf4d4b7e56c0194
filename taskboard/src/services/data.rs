//! Data service
//!
//! Sole owner of the in-memory board document. Consumers lock the shared
//! document, mutate it, then call [`DataService::notify_changed`]; the
//! service broadcasts a change event and schedules a debounced save.
//!
//! Saves are trailing-edge debounced by a single worker task: every change
//! pushes the deadline out by `save_delay`, and the whole document is
//! written once the changes go quiet. The snapshot is taken under a read
//! lock and written atomically outside it.

use crate::config::{
    DATA_FILE_NAME, DEFAULT_SAVE_DELAY_MS, EVENT_CHANNEL_CAPACITY, IMAGES_DIR_NAME,
    SIZE_ADVISORY_BYTES, SIZE_ADVISORY_INTERVAL_SECS,
};
use crate::error::{AppError, Result};
use crate::models::{AppData, Tab};
use crate::storage::JsonFile;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

/// Shared, long-lived handle to the live document
pub type SharedAppData = Arc<RwLock<AppData>>;

/// Runtime configuration for the data service
#[derive(Debug, Clone)]
pub struct DataServiceConfig {
    pub data_dir: PathBuf,
    /// Quiet period after the last change before the document is written
    pub save_delay: Duration,
    /// On-disk size above which a [`DataEvent::SizeAdvisory`] is raised
    pub size_advisory_bytes: u64,
    /// Minimum time between two size advisories
    pub size_advisory_interval: Duration,
}

impl DataServiceConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            save_delay: Duration::from_millis(DEFAULT_SAVE_DELAY_MS),
            size_advisory_bytes: SIZE_ADVISORY_BYTES,
            size_advisory_interval: Duration::from_secs(SIZE_ADVISORY_INTERVAL_SECS),
        }
    }

    pub fn with_save_delay(mut self, save_delay: Duration) -> Self {
        self.save_delay = save_delay;
        self
    }

    pub fn data_file(&self) -> PathBuf {
        self.data_dir.join(DATA_FILE_NAME)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(IMAGES_DIR_NAME)
    }
}

/// How the document was obtained at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No data file yet; started with an empty document
    Fresh,
    Loaded,
    /// The data file was unreadable; started with an empty document.
    /// `preserved` is the copy kept aside, if copying succeeded.
    Recovered { preserved: Option<PathBuf> },
}

/// Notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataEvent {
    Changed { tab_id: Option<String> },
    Saved { bytes: usize, compact: bool },
    SaveFailed { message: String },
    SizeAdvisory { size_bytes: u64 },
}

enum Command {
    Changed,
    Flush(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<Result<()>>),
}

struct Inner {
    data: SharedAppData,
    data_dir: PathBuf,
    images_dir: PathBuf,
    file: JsonFile,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<DataEvent>,
    save_count: Arc<AtomicU64>,
    load_outcome: LoadOutcome,
}

/// Persistence service for the board document
#[derive(Clone)]
pub struct DataService {
    inner: Arc<Inner>,
}

impl DataService {
    /// Load the document (or start fresh) and spawn the save worker.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(config: DataServiceConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).await?;
        fs::create_dir_all(config.images_dir()).await?;

        let file = JsonFile::new(config.data_file());
        let (document, load_outcome) = load_document(&file).await?;

        tracing::info!(
            "Data service opened at {:?} ({:?}, {} tabs)",
            file.path(),
            load_outcome,
            document.tabs.len()
        );

        let data = Arc::new(RwLock::new(document));
        let (commands, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let save_count = Arc::new(AtomicU64::new(0));

        let worker = SaveWorker {
            data: Arc::clone(&data),
            file: file.clone(),
            events: events.clone(),
            save_count: Arc::clone(&save_count),
            commands: receiver,
            save_delay: config.save_delay,
            size_advisory_bytes: config.size_advisory_bytes,
            size_advisory_interval: config.size_advisory_interval,
            last_advisory: None,
        };
        tokio::spawn(worker.run());

        Ok(Self {
            inner: Arc::new(Inner {
                data,
                data_dir: config.data_dir.clone(),
                images_dir: config.images_dir(),
                file,
                commands,
                events,
                save_count,
                load_outcome,
            }),
        })
    }

    /// The live document. Callers mutate it in place and then call
    /// [`notify_changed`](Self::notify_changed).
    pub fn app_data(&self) -> SharedAppData {
        Arc::clone(&self.inner.data)
    }

    /// Record a change: stamp the tab (if any), broadcast
    /// [`DataEvent::Changed`] and schedule a debounced save.
    ///
    /// Does not block, so it is safe to call while holding the write guard.
    pub fn notify_changed(&self, tab: Option<&mut Tab>) -> Result<()> {
        let tab_id = tab.map(|tab| {
            tab.touch();
            tab.id.clone()
        });

        let _ = self.inner.events.send(DataEvent::Changed { tab_id });

        self.inner.commands.send(Command::Changed).map_err(|_| {
            tracing::warn!("Change notified after shutdown; it will not be saved");
            AppError::ServiceStopped
        })
    }

    /// Apply `f` to one tab under the write lock, then notify
    pub async fn update_tab<F, T>(&self, tab_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Tab) -> Result<T>,
    {
        let mut data = self.inner.data.write().await;
        let tab = data
            .tab_mut(tab_id)
            .ok_or_else(|| AppError::TabNotFound(tab_id.to_string()))?;
        let value = f(&mut *tab)?;
        self.notify_changed(Some(tab))?;
        Ok(value)
    }

    /// Apply `f` to the whole document under the write lock, then notify
    pub async fn update<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut AppData) -> Result<T>,
    {
        let mut data = self.inner.data.write().await;
        let value = f(&mut *data)?;
        self.notify_changed(None)?;
        Ok(value)
    }

    /// Swap in a whole new document and return the previous one
    pub async fn replace_document(&self, document: AppData) -> Result<AppData> {
        let previous = {
            let mut data = self.inner.data.write().await;
            std::mem::replace(&mut *data, document)
        };
        self.notify_changed(None)?;
        tracing::info!("Document replaced ({} tabs before)", previous.tabs.len());
        Ok(previous)
    }

    /// Deep copy of the current document
    pub async fn snapshot(&self) -> AppData {
        self.inner.data.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.inner.events.subscribe()
    }

    /// Write any pending change now
    pub async fn flush(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Flush(reply))
            .map_err(|_| AppError::ServiceStopped)?;
        response.await.map_err(|_| AppError::ServiceStopped)?
    }

    /// Write any pending change and stop the save worker.
    ///
    /// When this returns `Ok`, the file matches the in-memory document.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Shutdown(reply))
            .map_err(|_| AppError::ServiceStopped)?;
        let result = response.await.map_err(|_| AppError::ServiceStopped)?;
        tracing::info!("Data service shut down");
        result
    }

    /// Number of successful writes since open
    pub fn save_count(&self) -> u64 {
        self.inner.save_count.load(Ordering::SeqCst)
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.inner.load_outcome
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub fn data_path(&self) -> &Path {
        self.inner.file.path()
    }

    pub fn images_dir(&self) -> &Path {
        &self.inner.images_dir
    }
}

async fn load_document(file: &JsonFile) -> Result<(AppData, LoadOutcome)> {
    let content = match file.read().await {
        Ok(Some(content)) => content,
        Ok(None) => {
            tracing::info!("Data file not found, starting with an empty document");
            return Ok((AppData::new(), LoadOutcome::Fresh));
        }
        Err(AppError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Ok((AppData::new(), recover(file, &e.to_string()).await));
        }
        Err(e) => return Err(e),
    };

    match AppData::from_json_str(&content) {
        Ok(document) => Ok((document, LoadOutcome::Loaded)),
        Err(e) => Ok((AppData::new(), recover(file, &e.to_string()).await)),
    }
}

async fn recover(file: &JsonFile, reason: &str) -> LoadOutcome {
    tracing::warn!(
        "Data file {:?} is unreadable, starting with an empty document: {}",
        file.path(),
        reason
    );

    let preserved = match file.preserve_as_corrupt().await {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!("Failed to keep a copy of the unreadable data file: {}", e);
            None
        }
    };

    LoadOutcome::Recovered { preserved }
}

/// Background task that owns the debounce timer and all document writes
struct SaveWorker {
    data: SharedAppData,
    file: JsonFile,
    events: broadcast::Sender<DataEvent>,
    save_count: Arc<AtomicU64>,
    commands: mpsc::UnboundedReceiver<Command>,
    save_delay: Duration,
    size_advisory_bytes: u64,
    size_advisory_interval: Duration,
    last_advisory: Option<Instant>,
}

impl SaveWorker {
    async fn run(mut self) {
        // Unsaved state exists; survives failed writes so flush can retry
        let mut pending = false;
        let mut deadline: Option<Instant> = None;

        loop {
            let command = match deadline {
                Some(at) => tokio::select! {
                    command = self.commands.recv() => command,
                    _ = tokio::time::sleep_until(at) => {
                        deadline = None;
                        if self.save().await.is_ok() {
                            pending = false;
                        }
                        continue;
                    }
                },
                None => self.commands.recv().await,
            };

            match command {
                Some(Command::Changed) => {
                    pending = true;
                    deadline = Some(Instant::now() + self.save_delay);
                }
                Some(Command::Flush(reply)) => {
                    deadline = None;
                    let result = self.save_if_pending(&mut pending).await;
                    let _ = reply.send(result);
                }
                Some(Command::Shutdown(reply)) => {
                    let result = self.save_if_pending(&mut pending).await;
                    let _ = reply.send(result);
                    break;
                }
                None => {
                    // Every handle dropped without an explicit shutdown
                    if pending {
                        let _ = self.save().await;
                    }
                    break;
                }
            }
        }

        tracing::debug!("Save worker stopped");
    }

    async fn save_if_pending(&mut self, pending: &mut bool) -> Result<()> {
        if !*pending {
            return Ok(());
        }
        self.save().await?;
        *pending = false;
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        match self.write_snapshot().await {
            Ok((bytes, compact)) => {
                self.save_count.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Document saved ({} bytes, compact: {})", bytes, compact);
                let _ = self.events.send(DataEvent::Saved { bytes, compact });
                self.check_file_size().await;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to save document to {:?}: {}", self.file.path(), e);
                let _ = self.events.send(DataEvent::SaveFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn write_snapshot(&self) -> Result<(usize, bool)> {
        let (json, compact) = {
            let data = self.data.read().await;
            let compact = data.is_large();
            (data.to_json_string(compact)?, compact)
        };

        self.file.write_atomic(json.as_bytes()).await?;
        Ok((json.len(), compact))
    }

    async fn check_file_size(&mut self) {
        let size = match self.file.size().await {
            Ok(Some(size)) => size,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!("Could not read data file size: {}", e);
                return;
            }
        };

        if size <= self.size_advisory_bytes {
            return;
        }

        let due = self
            .last_advisory
            .map_or(true, |at| at.elapsed() >= self.size_advisory_interval);
        if !due {
            return;
        }

        self.last_advisory = Some(Instant::now());
        tracing::info!(
            "Data file has reached {:.1} MB, which may affect performance; consider archiving old data",
            size as f64 / (1024.0 * 1024.0)
        );
        let _ = self.events.send(DataEvent::SizeAdvisory { size_bytes: size });
    }
}
