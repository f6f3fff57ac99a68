pub mod dashboard;
pub mod receipts;
pub mod settings;
