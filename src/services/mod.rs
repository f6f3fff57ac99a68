pub mod amount;
pub mod classifier;
pub mod extractor;
pub mod image;
pub mod keywords;
pub mod normalizer;
pub mod ocr;
pub mod parser;
pub mod processor;
pub mod queue;
pub mod recalculator;
pub mod state;
pub mod watcher;
