//! Document tree: AppData → Tabs → Columns/Rows
//!
//! Tabs own their schema and their rows. Row data is keyed by column id,
//! never by position or name, so the helpers here keep the two in step
//! (cascade on column removal, value rewrite on option rename).

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::config::{
    COMPACT_ROW_THRESHOLD, COMPACT_TAB_THRESHOLD, DEFAULT_DOT_COLOR, DEFAULT_TAB_NAME,
    SUM_INVALID_SAMPLE_LIMIT,
};
use crate::error::{AppError, Result};

use super::{new_id, CellValue, Column, ColumnType, OptionItem};

/// Root of the persisted document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppData {
    #[serde(default)]
    pub tabs: Vec<Tab>,
}

impl AppData {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document holding the starter "Daily Plan" tab
    pub fn with_default_tab() -> Self {
        Self {
            tabs: vec![Tab::daily_plan()],
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self, compact: bool) -> Result<String> {
        let json = if compact {
            serde_json::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        Ok(json)
    }

    /// Size heuristic that switches persistence to compact JSON
    pub fn is_large(&self) -> bool {
        self.tabs.len() > COMPACT_TAB_THRESHOLD
            || self.tabs.iter().any(|t| t.rows.len() > COMPACT_ROW_THRESHOLD)
    }

    pub fn tab(&self, id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn tab_mut(&mut self, id: &str) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id == id)
    }

    pub fn add_tab(&mut self, tab: Tab) -> &mut Tab {
        self.tabs.push(tab);
        let last = self.tabs.len() - 1;
        &mut self.tabs[last]
    }

    pub fn remove_tab(&mut self, id: &str) -> Result<Tab> {
        let index = self
            .tabs
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| AppError::TabNotFound(id.to_string()))?;
        Ok(self.tabs.remove(index))
    }

    /// Move a tab to a new position (clamped to the end)
    pub fn move_tab(&mut self, id: &str, to_index: usize) -> Result<()> {
        let from = self
            .tabs
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| AppError::TabNotFound(id.to_string()))?;
        let tab = self.tabs.remove(from);
        let to = to_index.min(self.tabs.len());
        self.tabs.insert(to, tab);
        Ok(())
    }
}

/// One record within a tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Row {
    pub id: String,
    /// Sparse: a missing key means no value has been entered yet
    pub data: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            data: BTreeMap::new(),
        }
    }

    pub fn get(&self, column_id: &str) -> Option<&CellValue> {
        self.data.get(column_id)
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of summing a column as numbers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnSum {
    pub sum: f64,
    pub valid_count: usize,
    pub invalid_count: usize,
    /// First few values that did not parse as numbers
    pub invalid_samples: Vec<String>,
}

/// A named collection of columns and rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", from = "RawTab")]
pub struct Tab {
    pub id: String,
    pub name: String,
    pub dot_color: String,
    pub last_modified: DateTime<Utc>,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl Tab {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            dot_color: DEFAULT_DOT_COLOR.to_string(),
            last_modified: Utc::now(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Tab with a single Text "Task" column
    pub fn with_task_column(name: impl Into<String>) -> Self {
        let mut tab = Self::new(name);
        tab.columns.push(Column::new("Task", ColumnType::Text));
        tab
    }

    /// Starter tab created for an empty document
    pub fn daily_plan() -> Self {
        let mut tab = Self::with_task_column("Daily Plan");
        tab.columns.push(
            Column::new("Status", ColumnType::Single).with_options(vec![
                OptionItem::new("Not Started", "#757575"),
                OptionItem::new("In Progress", "#FF6F00"),
                OptionItem::new("Completed", "#388E3C"),
            ]),
        );
        tab
    }

    /// Empty tab with a copy of this tab's columns and options.
    /// Columns get fresh ids; no rows are copied.
    pub fn with_schema_of(&self, name: impl Into<String>) -> Self {
        let mut tab = Self::new(name);
        tab.columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.column_type).with_options(c.options.clone()))
            .collect();
        tab
    }

    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    // ===== Columns =====

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_mut(&mut self, id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == id)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn add_column(&mut self, column: Column) -> Result<()> {
        column.validate()?;
        if self.column(&column.id).is_some() {
            return Err(AppError::InvalidColumn(format!(
                "column id {} already exists",
                column.id
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Remove a column and drop its values from every row of this tab
    pub fn remove_column(&mut self, id: &str) -> Result<Column> {
        let index = self
            .columns
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| AppError::ColumnNotFound(id.to_string()))?;
        let column = self.columns.remove(index);

        for row in &mut self.rows {
            row.data.remove(id);
        }

        Ok(column)
    }

    /// Change a column's type and convert its stored values to match.
    ///
    /// Options are cleared when the new type has none. Values that cannot
    /// be converted, or that name no option of a choice column, are dropped.
    /// Returns how many values were dropped.
    pub fn set_column_type(&mut self, column_id: &str, column_type: ColumnType) -> Result<usize> {
        let mut column = self
            .column(column_id)
            .cloned()
            .ok_or_else(|| AppError::ColumnNotFound(column_id.to_string()))?;
        if column.column_type == column_type {
            return Ok(0);
        }

        column.column_type = column_type;
        if !column_type.supports_options() {
            column.options.clear();
        }
        column.validate()?;

        let mut dropped = 0;
        for row in &mut self.rows {
            let Some(value) = row.data.remove(column_id) else {
                continue;
            };
            let converted = CellValue::decode(column_type, serde_json::to_value(&value)?);
            match converted {
                Ok(Some(value)) if names_known_options(&column, &value) => {
                    row.data.insert(column_id.to_string(), value);
                }
                Ok(None) => {}
                _ => {
                    tracing::debug!(
                        "Dropping value in row {} that does not convert to {}",
                        row.id,
                        column_type
                    );
                    dropped += 1;
                }
            }
        }

        if let Some(slot) = self.column_mut(column_id) {
            *slot = column;
        }
        tracing::debug!(
            "Column {} changed to {} ({} values dropped)",
            column_id,
            column_type,
            dropped
        );

        Ok(dropped)
    }

    // ===== Rows =====

    pub fn row(&self, id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn row_mut(&mut self, id: &str) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| r.id == id)
    }

    fn row_index(&self, id: &str) -> Result<usize> {
        self.rows
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| AppError::RowNotFound(id.to_string()))
    }

    /// Append an empty row
    pub fn add_row(&mut self) -> &mut Row {
        self.rows.push(Row::new());
        let last = self.rows.len() - 1;
        &mut self.rows[last]
    }

    /// Insert a row at `index` (clamped to the end)
    pub fn insert_row(&mut self, index: usize, row: Row) {
        let index = index.min(self.rows.len());
        self.rows.insert(index, row);
    }

    pub fn remove_row(&mut self, id: &str) -> Result<Row> {
        let index = self.row_index(id)?;
        Ok(self.rows.remove(index))
    }

    /// Copy a row's data into a new row placed right after it.
    /// Returns the new row id.
    pub fn duplicate_row(&mut self, id: &str) -> Result<String> {
        let index = self.row_index(id)?;
        let copy = Row {
            id: new_id(),
            data: self.rows[index].data.clone(),
        };
        let copy_id = copy.id.clone();
        self.rows.insert(index + 1, copy);
        Ok(copy_id)
    }

    pub fn move_row(&mut self, id: &str, to_index: usize) -> Result<()> {
        let from = self.row_index(id)?;
        let row = self.rows.remove(from);
        let to = to_index.min(self.rows.len());
        self.rows.insert(to, row);
        Ok(())
    }

    // ===== Cells =====

    pub fn cell(&self, row_id: &str, column_id: &str) -> Option<&CellValue> {
        self.row(row_id)?.get(column_id)
    }

    /// Set a cell after checking the value against the column's type
    /// and, for choice columns, its options.
    pub fn set_cell(&mut self, row_id: &str, column_id: &str, value: CellValue) -> Result<()> {
        let column = self
            .column(column_id)
            .ok_or_else(|| AppError::ColumnNotFound(column_id.to_string()))?;

        if !value.fits(column.column_type) {
            return Err(AppError::CellTypeMismatch {
                column_id: column_id.to_string(),
                expected: column.column_type,
                actual: value.column_type(),
            });
        }

        let unknown_label = match &value {
            CellValue::Choice(label) if !label.is_empty() => {
                column.option(label).is_none().then(|| label.clone())
            }
            CellValue::Choices(labels) => labels
                .iter()
                .find(|label| column.option(label).is_none())
                .cloned(),
            _ => None,
        };
        if let Some(label) = unknown_label {
            return Err(AppError::OptionNotFound {
                column_id: column_id.to_string(),
                label,
            });
        }

        let row = self
            .row_mut(row_id)
            .ok_or_else(|| AppError::RowNotFound(row_id.to_string()))?;
        row.data.insert(column_id.to_string(), value);
        Ok(())
    }

    pub fn clear_cell(&mut self, row_id: &str, column_id: &str) -> Result<Option<CellValue>> {
        let row = self
            .row_mut(row_id)
            .ok_or_else(|| AppError::RowNotFound(row_id.to_string()))?;
        Ok(row.data.remove(column_id))
    }

    // ===== Options =====

    fn choice_column_mut(&mut self, column_id: &str) -> Result<&mut Column> {
        let column = self
            .column_mut(column_id)
            .ok_or_else(|| AppError::ColumnNotFound(column_id.to_string()))?;
        if !column.column_type.supports_options() {
            return Err(AppError::InvalidColumn(format!(
                "{} column '{}' has no options",
                column.column_type, column.name
            )));
        }
        Ok(column)
    }

    /// Rename an option and rewrite every stored value that used the old
    /// label. Returns the number of rows rewritten.
    pub fn rename_option(&mut self, column_id: &str, old_label: &str, new_label: &str) -> Result<usize> {
        let column = self.choice_column_mut(column_id)?;
        if old_label != new_label && column.option(new_label).is_some() {
            return Err(AppError::InvalidColumn(format!(
                "option '{}' already exists in column '{}'",
                new_label, column.name
            )));
        }
        let option = column
            .options
            .iter_mut()
            .find(|o| o.label == old_label)
            .ok_or_else(|| AppError::OptionNotFound {
                column_id: column_id.to_string(),
                label: old_label.to_string(),
            })?;
        option.label = new_label.to_string();

        let mut rewritten = 0;
        for row in &mut self.rows {
            let changed = match row.data.get_mut(column_id) {
                Some(CellValue::Choice(label)) if label == old_label => {
                    *label = new_label.to_string();
                    true
                }
                Some(CellValue::Choices(labels)) => {
                    let mut hit = false;
                    for label in labels.iter_mut().filter(|l| l.as_str() == old_label) {
                        *label = new_label.to_string();
                        hit = true;
                    }
                    hit
                }
                _ => false,
            };
            if changed {
                rewritten += 1;
            }
        }

        Ok(rewritten)
    }

    /// Remove an option and clear it from every row that selected it.
    /// Returns the number of rows touched.
    pub fn remove_option(&mut self, column_id: &str, label: &str) -> Result<usize> {
        let column = self.choice_column_mut(column_id)?;
        let before = column.options.len();
        column.options.retain(|o| o.label != label);
        if column.options.len() == before {
            return Err(AppError::OptionNotFound {
                column_id: column_id.to_string(),
                label: label.to_string(),
            });
        }

        let mut touched = 0;
        for row in &mut self.rows {
            let clear = match row.data.get_mut(column_id) {
                Some(CellValue::Choice(selected)) => selected.as_str() == label,
                Some(CellValue::Choices(selected)) if selected.iter().any(|l| l == label) => {
                    selected.retain(|l| l != label);
                    touched += 1;
                    false
                }
                _ => false,
            };
            if clear {
                row.data.remove(column_id);
                touched += 1;
            }
        }

        Ok(touched)
    }

    // ===== Aggregates =====

    /// Sum a column's non-blank values as numbers
    pub fn column_sum(&self, column_id: &str) -> Result<ColumnSum> {
        if self.column(column_id).is_none() {
            return Err(AppError::ColumnNotFound(column_id.to_string()));
        }

        let mut result = ColumnSum::default();
        for value in self.rows.iter().filter_map(|r| r.get(column_id)) {
            let text = value.display_text();
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match text.parse::<f64>() {
                Ok(n) if n.is_finite() => {
                    result.sum += n;
                    result.valid_count += 1;
                }
                _ => {
                    result.invalid_count += 1;
                    if result.invalid_samples.len() < SUM_INVALID_SAMPLE_LIMIT {
                        result.invalid_samples.push(text.to_string());
                    }
                }
            }
        }

        Ok(result)
    }
}

impl Default for Tab {
    fn default() -> Self {
        Self::new(DEFAULT_TAB_NAME)
    }
}

// ===== Schema-directed deserialization =====

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTab {
    #[serde(default = "new_id")]
    id: String,
    #[serde(default = "default_tab_name")]
    name: String,
    #[serde(default = "default_dot_color")]
    dot_color: String,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    last_modified: DateTime<Utc>,
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    rows: Vec<RawRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRow {
    #[serde(default = "new_id")]
    id: String,
    #[serde(default)]
    data: BTreeMap<String, Value>,
}

fn default_tab_name() -> String {
    DEFAULT_TAB_NAME.to_string()
}

fn default_dot_color() -> String {
    DEFAULT_DOT_COLOR.to_string()
}

/// Whether a choice value only names options the column offers.
/// Non-choice values and an empty single choice always pass.
fn names_known_options(column: &Column, value: &CellValue) -> bool {
    match value {
        CellValue::Choice(label) => label.is_empty() || column.option(label).is_some(),
        CellValue::Choices(labels) => labels.iter().all(|label| column.option(label).is_some()),
        _ => true,
    }
}

/// Accepts RFC 3339 as well as offset-less local timestamps.
/// Anything unreadable becomes "now" rather than failing the document.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::String(raw) => raw,
        Value::Null => return Ok(Utc::now()),
        other => {
            tracing::warn!("Unreadable LastModified {}, using current time", other);
            return Ok(Utc::now());
        }
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let local = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());
    match local {
        Some(ts) => Ok(ts.with_timezone(&Utc)),
        None => {
            tracing::warn!("Unreadable LastModified '{}', using current time", raw);
            Ok(Utc::now())
        }
    }
}

impl From<RawTab> for Tab {
    fn from(raw: RawTab) -> Self {
        let RawTab {
            id,
            name,
            dot_color,
            last_modified,
            columns,
            rows,
        } = raw;

        let types: HashMap<&str, ColumnType> = columns
            .iter()
            .map(|c| (c.id.as_str(), c.column_type))
            .collect();

        let rows = rows
            .into_iter()
            .map(|raw_row| decode_row(&id, raw_row, &types))
            .collect();

        Self {
            id,
            name,
            dot_color,
            last_modified,
            columns,
            rows,
        }
    }
}

fn decode_row(tab_id: &str, raw: RawRow, types: &HashMap<&str, ColumnType>) -> Row {
    let mut data = BTreeMap::new();

    for (column_id, value) in raw.data {
        let Some(&column_type) = types.get(column_id.as_str()) else {
            tracing::debug!(
                "Dropping value for unknown column {} in tab {} row {}",
                column_id,
                tab_id,
                raw.id
            );
            continue;
        };

        match CellValue::decode(column_type, value) {
            Ok(Some(cell)) => {
                data.insert(column_id, cell);
            }
            Ok(None) => {}
            Err(reason) => {
                tracing::warn!(
                    "Dropping unreadable {} value in tab {} row {} column {}: {}",
                    column_type,
                    tab_id,
                    raw.id,
                    column_id,
                    reason
                );
            }
        }
    }

    Row { id: raw.id, data }
}
