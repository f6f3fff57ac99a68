use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::models::{
    ItemEdit, ReceiptEvent, Settings, SubmissionAggregate, UnreadableFile, UploadFile, UploadedReceipt,
};
use crate::services::image::ImageHandle;
use crate::services::ocr::OcrEngine;
use crate::services::parser::ReceiptParser;
use crate::services::processor::{log_outcome, process_receipt, JobOutcome};
use crate::services::queue::{Intake, OcrJob, ReceiptQueue, RejectedUpload, StagedUpload};
use crate::services::watcher::{debounce_file_event, FileEvent, WatcherService};
use crate::utils::sha256_bytes;

const EVENT_CAPACITY: usize = 256;

/// Shared application state and the single driver of the OCR queue.
///
/// Jobs are only ever started from `on_state_change`, which hands out at most
/// one job per call; the queue itself refuses to start a second one while a
/// receipt is processing.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub settings: Arc<Mutex<Settings>>,
    queue: Arc<Mutex<ReceiptQueue>>,
    parser: Arc<ReceiptParser>,
    engine: Arc<dyn OcrEngine>,
    staging_dir: PathBuf,
    events: broadcast::Sender<ReceiptEvent>,
    watcher: Arc<Mutex<Option<WatcherService>>>,
}

impl AppState {
    pub fn new(
        db: Database,
        settings: Settings,
        engine: Arc<dyn OcrEngine>,
        parser: ReceiptParser,
        staging_dir: PathBuf,
    ) -> Result<Self> {
        std::fs::create_dir_all(&staging_dir)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(AppState {
            db: Arc::new(Mutex::new(db)),
            settings: Arc::new(Mutex::new(settings)),
            queue: Arc::new(Mutex::new(ReceiptQueue::new())),
            parser: Arc::new(parser),
            engine,
            staging_dir,
            events,
            watcher: Arc::new(Mutex::new(None)),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReceiptEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ReceiptEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_queue(&self) -> Result<std::sync::MutexGuard<'_, ReceiptQueue>> {
        self.queue.lock().map_err(|_| anyhow!("Queue lock"))
    }

    /// Stages every file, then adds the whole batch to the collection and the
    /// queue in one step. Must be called from within a tokio runtime.
    pub fn upload(&self, files: Vec<UploadFile>) -> Result<Vec<String>> {
        self.admit(files.into_iter().map(Ok).collect())
    }

    /// Like `upload`, for a selection where some files could not be read. A
    /// file that cannot be read or staged becomes a failed receipt with an
    /// inline error; the rest of the batch is queued as usual.
    pub fn admit(&self, files: Vec<Result<UploadFile, UnreadableFile>>) -> Result<Vec<String>> {
        let batch = files.into_iter().map(|file| self.stage(file)).collect::<Vec<_>>();

        let added = self.lock_queue()?.admit(batch);
        let ids = added.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        info!(count = ids.len(), "uploaded receipts");
        for receipt in added {
            if let Some(message) = receipt.error.clone() {
                self.emit(ReceiptEvent::ProcessingError {
                    receipt_id: receipt.id.clone(),
                    message,
                });
                if let Err(err) = log_outcome(&self.db, &receipt) {
                    warn!(error = %err, "failed to log processing outcome");
                }
            }
            self.emit(ReceiptEvent::ReceiptUpdated(receipt));
        }

        self.on_state_change()?;
        Ok(ids)
    }

    fn stage(&self, file: Result<UploadFile, UnreadableFile>) -> Intake {
        let id = uuid::Uuid::new_v4().to_string();
        let file = match file {
            Ok(file) => file,
            Err(unreadable) => {
                return Intake::Rejected(RejectedUpload {
                    id,
                    file_name: unreadable.file_name,
                    image_hash: String::new(),
                    error: unreadable.error,
                })
            }
        };

        let image_hash = sha256_bytes(&file.bytes);
        match ImageHandle::stage(&self.staging_dir, &id, &file.file_name, &file.bytes) {
            Ok(image) => Intake::Staged(StagedUpload {
                id,
                file_name: file.file_name,
                image,
                image_hash,
            }),
            Err(err) => Intake::Rejected(RejectedUpload {
                id,
                file_name: file.file_name,
                image_hash,
                error: err.to_string(),
            }),
        }
    }

    /// Starts the next OCR job if none is running.
    pub fn on_state_change(&self) -> Result<()> {
        let (outcome, idle) = {
            let mut queue = self.lock_queue()?;
            let outcome = queue.start_next();
            let idle = queue.is_idle();
            (outcome, idle)
        };

        for receipt in outcome.invalidated {
            self.emit(ReceiptEvent::ProcessingError {
                receipt_id: receipt.id.clone(),
                message: receipt.error.clone().unwrap_or_default(),
            });
            if let Err(err) = log_outcome(&self.db, &receipt) {
                warn!(error = %err, "failed to log processing outcome");
            }
            self.emit(ReceiptEvent::ReceiptUpdated(receipt));
        }

        let Some(job) = outcome.job else {
            if idle {
                debug!("queue idle");
                self.emit(ReceiptEvent::QueueIdle);
            }
            return Ok(());
        };

        if let Some(receipt) = self.lock_queue()?.get(&job.receipt_id).cloned() {
            self.emit(ReceiptEvent::ReceiptUpdated(receipt));
        }

        let state = self.clone();
        tokio::spawn(async move {
            if let Err(err) = state.run_job(job).await {
                error!(error = %err, "OCR job bookkeeping failed");
            }
        });
        Ok(())
    }

    async fn run_job(&self, job: OcrJob) -> Result<()> {
        let engine = self.engine.clone();
        let parser = self.parser.clone();
        let task_job = job.clone();
        // A panicking engine or parser must still release the in-flight slot.
        let task = tokio::spawn(async move { process_receipt(engine.as_ref(), &parser, &task_job).await });
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(receipt_id = %job.receipt_id, error = %err, "OCR job aborted");
                JobOutcome::Failed {
                    message: "Processing this receipt crashed".to_string(),
                }
            }
        };

        let written = {
            let mut queue = self.lock_queue()?;
            match &outcome {
                JobOutcome::Recognized { text, parsed } => {
                    queue.complete_success(&job, text.clone(), parsed.clone())
                }
                JobOutcome::Failed { message } => queue.complete_failure(&job, message),
            }
        };

        match written {
            Some(receipt) => {
                if let JobOutcome::Failed { message } = &outcome {
                    self.emit(ReceiptEvent::ProcessingError {
                        receipt_id: receipt.id.clone(),
                        message: message.clone(),
                    });
                }
                if let Err(err) = log_outcome(&self.db, &receipt) {
                    warn!(error = %err, "failed to log processing outcome");
                }
                self.emit(ReceiptEvent::ReceiptUpdated(receipt));
            }
            None => debug!(receipt_id = %job.receipt_id, "receipt removed during OCR, result discarded"),
        }

        // Release our image reference before the next job starts.
        drop(job);
        self.on_state_change()
    }

    pub fn remove(&self, receipt_id: &str) -> Result<bool> {
        let removed = self.lock_queue()?.remove(receipt_id);
        let Some(receipt) = removed else {
            return Ok(false);
        };
        drop(receipt);
        self.emit(ReceiptEvent::ReceiptRemoved {
            receipt_id: receipt_id.to_string(),
        });
        self.on_state_change()?;
        Ok(true)
    }

    /// Replaces a receipt with a fresh upload; the new receipt gets a new id.
    /// The old receipt is only removed once the new file is staged.
    pub fn replace(&self, receipt_id: &str, file: UploadFile) -> Result<String> {
        let upload = match self.stage(Ok(file)) {
            Intake::Staged(upload) => upload,
            Intake::Rejected(rejected) => return Err(anyhow!(rejected.error)),
        };

        let (removed, added) = self.lock_queue()?.replace(receipt_id, upload)?;
        drop(removed);
        info!(old = %receipt_id, new = %added.id, "replaced receipt");
        self.emit(ReceiptEvent::ReceiptRemoved {
            receipt_id: receipt_id.to_string(),
        });
        let id = added.id.clone();
        self.emit(ReceiptEvent::ReceiptUpdated(added));
        self.on_state_change()?;
        Ok(id)
    }

    pub fn edit_item(&self, receipt_id: &str, item_id: u32, edit: ItemEdit) -> Result<UploadedReceipt> {
        let receipt = self.lock_queue()?.edit_item(receipt_id, item_id, edit)?;
        self.emit(ReceiptEvent::ReceiptUpdated(receipt.clone()));
        Ok(receipt)
    }

    pub fn add_item(&self, receipt_id: &str, description: &str, price: &str) -> Result<UploadedReceipt> {
        let receipt = self.lock_queue()?.add_item(receipt_id, description, price)?;
        self.emit(ReceiptEvent::ReceiptUpdated(receipt.clone()));
        Ok(receipt)
    }

    pub fn remove_item(&self, receipt_id: &str, item_id: u32) -> Result<UploadedReceipt> {
        let receipt = self.lock_queue()?.remove_item(receipt_id, item_id)?;
        self.emit(ReceiptEvent::ReceiptUpdated(receipt.clone()));
        Ok(receipt)
    }

    pub fn snapshot(&self) -> Result<Vec<UploadedReceipt>> {
        Ok(self.lock_queue()?.receipts().to_vec())
    }

    pub fn receipt(&self, receipt_id: &str) -> Result<Option<UploadedReceipt>> {
        Ok(self.lock_queue()?.get(receipt_id).cloned())
    }

    pub fn grand_total(&self) -> Result<i64> {
        self.lock_queue()?
            .grand_total()
            .ok_or_else(|| anyhow!("Grand total is out of range"))
    }

    /// Re-derives item-sum totals across the batch and reports each change.
    pub fn recompute(&self) -> Result<usize> {
        let (changed, receipts) = {
            let mut queue = self.lock_queue()?;
            let changed = queue.recompute();
            (changed, queue.receipts().to_vec())
        };
        if changed > 0 {
            debug!(changed, "recomputed receipt totals");
            for receipt in receipts {
                self.emit(ReceiptEvent::ReceiptUpdated(receipt));
            }
        }
        Ok(changed)
    }

    pub fn is_idle(&self) -> Result<bool> {
        Ok(self.lock_queue()?.is_idle())
    }

    pub fn submission(&self, title: &str) -> Result<SubmissionAggregate> {
        Ok(self.lock_queue()?.submission(title)?)
    }

    /// Records the aggregate and clears the batch, releasing every image.
    pub fn complete_submission(&self, title: &str) -> Result<SubmissionAggregate> {
        let (aggregate, cleared) = {
            let mut queue = self.lock_queue()?;
            queue.recompute();
            let aggregate = queue.submission(title)?;
            (aggregate, queue.clear())
        };

        let payload = serde_json::to_string(&aggregate)?;
        {
            let db = self.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            let id = db.record_submission(
                &aggregate.title,
                &aggregate.grand_total,
                aggregate.receipts.len(),
                &payload,
            )?;
            info!(submission_id = %id, receipts = aggregate.receipts.len(), total = %aggregate.grand_total, "submitted batch");
        }

        for receipt in cleared {
            self.emit(ReceiptEvent::ReceiptRemoved {
                receipt_id: receipt.id.clone(),
            });
        }
        Ok(aggregate)
    }

    /// Resolves once no receipt is queued or processing.
    pub async fn wait_idle(&self) -> Result<()> {
        let mut rx = self.subscribe();
        loop {
            if self.is_idle()? {
                return Ok(());
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        {
            let mut locked = self.settings.lock().map_err(|_| anyhow!("Settings lock"))?;
            *locked = settings;
        }
        self.restart_watcher()
    }

    /// (Re)starts the drop-folder watcher from the current settings. Files that
    /// settle in the folder are uploaded as new receipts.
    pub fn restart_watcher(&self) -> Result<()> {
        let mut guard = self.watcher.lock().map_err(|_| anyhow!("Watcher lock"))?;
        *guard = None;

        let settings = self.settings.lock().map_err(|_| anyhow!("Settings lock"))?.clone();
        let Some(folder) = settings.watch_folder.map(PathBuf::from) else {
            return Ok(());
        };

        let (tx, rx) = mpsc::channel();
        *guard = Some(WatcherService::start(folder.clone(), tx)?);
        info!(folder = %folder.display(), "watching drop folder");

        let state = self.clone();
        let runtime = tokio::runtime::Handle::current();
        std::thread::spawn(move || {
            let _entered = runtime.enter();
            for event in rx {
                handle_event(event, &state);
            }
        });

        Ok(())
    }
}

fn handle_event(event: FileEvent, state: &AppState) {
    if !debounce_file_event(&event.path, 700) {
        return;
    }
    let file_name = event
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "receipt".to_string());
    let bytes = match std::fs::read(&event.path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %event.path.display(), error = %err, "cannot read dropped file");
            return;
        }
    };
    debug!(path = %event.path.display(), kind = ?event.kind, "dropped file settled");
    if let Err(err) = state.upload(vec![UploadFile { file_name, bytes }]) {
        error!(path = %event.path.display(), error = %err, "upload from drop folder failed");
    }
}
