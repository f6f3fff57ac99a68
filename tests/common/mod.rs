#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use receipt_ocr::db::Database;
use receipt_ocr::models::{Settings, UploadFile};
use receipt_ocr::services::image::ImageHandle;
use receipt_ocr::services::keywords::KeywordTable;
use receipt_ocr::services::ocr::{OcrEngine, Recognition};
use receipt_ocr::services::parser::ReceiptParser;
use receipt_ocr::services::state::AppState;

/// OCR engine that answers from a script keyed by file name. With a gate,
/// every call waits for a permit so tests decide when jobs finish.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: HashMap<String, Result<String, String>>,
    panics: HashSet<String>,
    gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, file_name: &str, text: &str) -> Self {
        self.scripts.insert(file_name.to_string(), Ok(text.to_string()));
        self
    }

    pub fn failure(mut self, file_name: &str, message: &str) -> Self {
        self.scripts.insert(file_name.to_string(), Err(message.to_string()));
        self
    }

    pub fn panicking(mut self, file_name: &str) -> Self {
        self.panics.insert(file_name.to_string());
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for ScriptedEngine {
    async fn recognize(&self, image: &ImageHandle) -> Result<Recognition> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.calls.lock().unwrap().push(image.file_name().to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.panics.contains(image.file_name()) {
            panic!("engine blew up on {}", image.file_name());
        }

        match self.scripts.get(image.file_name()) {
            Some(Ok(text)) => Ok(Recognition { text: text.clone() }),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Err(anyhow!("no script for {}", image.file_name())),
        }
    }
}

pub struct Harness {
    pub state: AppState,
    pub engine: Arc<ScriptedEngine>,
    pub staging: TempDir,
}

pub fn harness(engine: ScriptedEngine) -> Harness {
    let staging = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine);
    let parser = ReceiptParser::new(&KeywordTable::builtin()).unwrap();
    let state = AppState::new(
        Database::in_memory().unwrap(),
        Settings::default(),
        engine.clone(),
        parser,
        staging.path().to_path_buf(),
    )
    .unwrap();
    Harness { state, engine, staging }
}

pub fn file(name: &str) -> UploadFile {
    UploadFile {
        file_name: name.to_string(),
        bytes: format!("image bytes of {}", name).into_bytes(),
    }
}

pub async fn settle(state: &AppState) {
    tokio::time::timeout(Duration::from_secs(5), state.wait_idle())
        .await
        .expect("queue did not settle")
        .unwrap();
}

/// Polls until `check` holds, failing the test after a few seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub const COFFEE_RECEIPT: &str = "CORNER CAFE\nTel 555-0100\nCoffee 3.50\nBagel 2.25\nTOTAL 5.75\nCash 10.00\nChange 4.25\n";
pub const LUNCH_RECEIPT: &str = "Soup 4.00\nSalad 6.50\nSubtotal 10.50\n";
pub const SNACK_RECEIPT: &str = "Chips 1.99\nSoda 1.01\n";
