pub mod cursors;
pub mod health;
pub mod metrics;
pub mod records;
