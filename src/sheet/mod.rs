// src/sheet/mod.rs
pub mod google;
pub mod layout;

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One row of a worksheet, cells in column order.
pub type Row = Vec<String>;

/// Positional table with no schema and no transactional guarantees.
/// Row indices are zero-based in `read_rows` order and are only valid
/// until the next mutation by anyone (the sheet is edited by hand too).
#[async_trait::async_trait]
pub trait TabularSource: Send + Sync {
    async fn read_rows(&self) -> Result<Vec<Row>>;
    async fn append_row(&self, row: Row) -> Result<()>;
    async fn update_row(&self, index: usize, row: Row) -> Result<()>;
    async fn delete_row(&self, index: usize) -> Result<()>;
    fn name(&self) -> &str;
}

/// In-process table, used by tests and local demos.
pub struct MemorySheet {
    name: String,
    rows: Mutex<Vec<Row>>,
    fail_reads: AtomicBool,
}

impl MemorySheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn with_rows(name: impl Into<String>, rows: Vec<Row>) -> Self {
        let sheet = Self::new(name);
        sheet.set_rows(rows);
        sheet
    }

    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.rows.lock().expect("sheet mutex poisoned") = rows;
    }

    pub fn push_row(&self, row: Row) {
        self.rows.lock().expect("sheet mutex poisoned").push(row);
    }

    pub fn snapshot(&self) -> Vec<Row> {
        self.rows.lock().expect("sheet mutex poisoned").clone()
    }

    /// Simulate the remote sheet being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_reads.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TabularSource for MemorySheet {
    async fn read_rows(&self) -> Result<Vec<Row>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("worksheet {} unavailable", self.name));
        }
        Ok(self.snapshot())
    }

    async fn append_row(&self, row: Row) -> Result<()> {
        self.push_row(row);
        Ok(())
    }

    async fn update_row(&self, index: usize, row: Row) -> Result<()> {
        let mut rows = self.rows.lock().expect("sheet mutex poisoned");
        let slot = rows
            .get_mut(index)
            .ok_or_else(|| anyhow!("row {index} out of range in {}", self.name))?;
        *slot = row;
        Ok(())
    }

    async fn delete_row(&self, index: usize) -> Result<()> {
        let mut rows = self.rows.lock().expect("sheet mutex poisoned");
        if index >= rows.len() {
            return Err(anyhow!("row {index} out of range in {}", self.name));
        }
        rows.remove(index);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
