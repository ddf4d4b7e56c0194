//! Document model
//!
//! Schema-flexible board data: tabs own column definitions and rows, rows
//! hold sparse, typed values keyed by column id. Field names are written
//! in PascalCase to stay compatible with existing `data.json` files.

mod cell;
mod column;
mod document;

pub use cell::{CellValue, TodoItem};
pub use column::{Column, ColumnType, OptionItem};
pub use document::{AppData, ColumnSum, Row, Tab};

/// Fresh random identifier for any entity
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
