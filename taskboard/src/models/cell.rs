//! Cell values
//!
//! Row data is stored as a sparse map from column id to [`CellValue`].
//! On disk a cell is plain JSON whose shape depends on the owning column,
//! so decoding always goes through [`CellValue::decode`] with the column
//! type in hand.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{new_id, ColumnType};

/// A single entry in a TodoList cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TodoItem {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_completed: bool,
}

impl TodoItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            text: text.into(),
            is_completed: false,
        }
    }

    pub fn completed(mut self) -> Self {
        self.is_completed = true;
        self
    }
}

/// Typed value of one cell.
///
/// Each variant belongs to exactly one [`ColumnType`]. Serialization is
/// untagged so the on-disk shape stays a bare string or array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    /// Label of the selected option
    Choice(String),
    /// Labels of the selected options (legacy multi-select)
    Choices(Vec<String>),
    /// Image file names, relative to the images directory
    Images(Vec<String>),
    Todos(Vec<TodoItem>),
    RichText(String),
}

impl CellValue {
    /// The column type this value belongs to
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Text(_) => ColumnType::Text,
            CellValue::Choice(_) => ColumnType::Single,
            CellValue::Choices(_) => ColumnType::Multi,
            CellValue::Images(_) => ColumnType::Image,
            CellValue::Todos(_) => ColumnType::TodoList,
            CellValue::RichText(_) => ColumnType::TextArea,
        }
    }

    pub fn fits(&self, column_type: ColumnType) -> bool {
        self.column_type() == column_type
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Text(s) | CellValue::Choice(s) | CellValue::RichText(s) => s.is_empty(),
            CellValue::Choices(items) | CellValue::Images(items) => items.is_empty(),
            CellValue::Todos(items) => items.is_empty(),
        }
    }

    /// Plain-text rendering used for filtering, sums and exports
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Text(s) | CellValue::Choice(s) | CellValue::RichText(s) => s.clone(),
            CellValue::Choices(items) | CellValue::Images(items) => items.join(", "),
            CellValue::Todos(items) => {
                let done = items.iter().filter(|t| t.is_completed).count();
                format!("{}/{}", done, items.len())
            }
        }
    }

    /// Interpret raw JSON as a value of the given column type.
    ///
    /// Returns `Ok(None)` for null (an unset cell). Shapes that older builds
    /// produced are coerced; anything else is reported as an error string.
    pub fn decode(column_type: ColumnType, raw: Value) -> Result<Option<CellValue>, String> {
        if raw.is_null() {
            return Ok(None);
        }

        let value = match column_type {
            ColumnType::Text => CellValue::Text(scalar_text(raw)?),
            ColumnType::Single => CellValue::Choice(scalar_text(raw)?),
            ColumnType::TextArea => CellValue::RichText(scalar_text(raw)?),
            ColumnType::Multi => CellValue::Choices(string_list(raw)?),
            ColumnType::Image => CellValue::Images(string_list(raw)?),
            ColumnType::TodoList => CellValue::Todos(todo_list(raw)?),
        };

        Ok(Some(value))
    }
}

fn scalar_text(raw: Value) -> Result<String, String> {
    match raw {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        // A column switched from multi-select to text keeps its labels
        Value::Array(items) => {
            let parts = items
                .into_iter()
                .map(scalar_text)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join(", "))
        }
        Value::Object(_) => Err("expected a string, found an object".to_string()),
        Value::Null => Ok(String::new()),
    }
}

fn string_list(raw: Value) -> Result<Vec<String>, String> {
    match raw {
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(scalar_text)
            .collect(),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Number(_) | Value::Bool(_) => Ok(vec![scalar_text(raw)?]),
        Value::Object(_) => Err("expected a list of strings, found an object".to_string()),
        Value::Null => Ok(Vec::new()),
    }
}

fn todo_list(raw: Value) -> Result<Vec<TodoItem>, String> {
    match raw {
        Value::Array(items) => items.into_iter().map(todo_item).collect(),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![TodoItem::new(s)]),
        Value::Object(_) => Ok(vec![todo_item(raw)?]),
        other => Err(format!("expected a todo list, found {}", other)),
    }
}

fn todo_item(raw: Value) -> Result<TodoItem, String> {
    match raw {
        Value::String(s) => Ok(TodoItem::new(s)),
        Value::Object(_) => serde_json::from_value(raw).map_err(|e| e.to_string()),
        other => Err(format!("expected a todo item, found {}", other)),
    }
}
