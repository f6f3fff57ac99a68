use anyhow::Result;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

const RECEIPT_EXTENSIONS: [&str; 10] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp", "gif", "pdf", "txt"];

#[derive(Debug, Clone)]
pub enum FileEventKind {
    Created,
    Modified,
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Watches a drop folder for new receipt files.
pub struct WatcherService {
    _watcher: RecommendedWatcher,
}

impl WatcherService {
    pub fn start(folder: PathBuf, tx: mpsc::Sender<FileEvent>) -> Result<Self> {
        std::fs::create_dir_all(&folder)?;
        let watcher = create_watcher(folder, tx)?;
        Ok(WatcherService { _watcher: watcher })
    }
}

fn create_watcher(path: PathBuf, tx: mpsc::Sender<FileEvent>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let kind = match event.kind {
                EventKind::Create(_) => FileEventKind::Created,
                EventKind::Modify(_) => FileEventKind::Modified,
                _ => return,
            };
            for path in event.paths {
                if is_receipt_file(&path) {
                    let _ = tx.send(FileEvent {
                        path: path.to_path_buf(),
                        kind: kind.clone(),
                    });
                }
            }
        }
    })?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

pub fn is_receipt_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RECEIPT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Collects receipt files from a mix of file and directory paths.
pub fn collect_receipt_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries = walkdir::WalkDir::new(path)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .filter(|e| is_receipt_file(e.path()))
                .map(|e| e.path().to_path_buf())
                .collect::<Vec<_>>();
            entries.sort();
            files.extend(entries);
        } else if path.is_file() {
            files.push(path.clone());
        }
    }
    files
}

/// Waits until the file size stops changing, so half-copied files are skipped.
pub fn debounce_file_event(path: &Path, debounce_ms: u64) -> bool {
    let mut last_size = None;
    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(debounce_ms));
        if let Ok(metadata) = std::fs::metadata(path) {
            let size = metadata.len();
            if Some(size) == last_size {
                return size > 0;
            }
            last_size = Some(size);
        } else {
            return false;
        }
    }
    last_size.unwrap_or(0) > 0
}
