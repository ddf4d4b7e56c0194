//! Column definitions
//!
//! A column is a schema slot: a stable id, a cosmetic name, a closed
//! value type and, for choice columns, the labeled options on offer.

use crate::config::{DEFAULT_COLUMN_NAME, DEFAULT_OPTION_COLOR};
use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::new_id;

/// Value type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnType {
    Text,
    Single,
    /// Legacy multi-select; newer builds no longer offer it for new columns
    Multi,
    Image,
    TodoList,
    TextArea,
}

impl ColumnType {
    /// All variants in their legacy numeric order
    pub const ALL: [ColumnType; 6] = [
        ColumnType::Text,
        ColumnType::Single,
        ColumnType::Multi,
        ColumnType::Image,
        ColumnType::TodoList,
        ColumnType::TextArea,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Text => "Text",
            ColumnType::Single => "Single",
            ColumnType::Multi => "Multi",
            ColumnType::Image => "Image",
            ColumnType::TodoList => "TodoList",
            ColumnType::TextArea => "TextArea",
        }
    }

    /// Whether columns of this type carry a list of options
    pub fn supports_options(self) -> bool {
        match self {
            ColumnType::Single | ColumnType::Multi => true,
            ColumnType::Text | ColumnType::Image | ColumnType::TodoList | ColumnType::TextArea => {
                false
            }
        }
    }

    pub fn is_legacy(self) -> bool {
        matches!(self, ColumnType::Multi)
    }

    fn from_index(index: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(index).ok()?).copied()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown column type: {}", s))
    }
}

/// Older builds wrote the type as its enum index, newer ones as its name
#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnTypeRepr {
    Name(String),
    Index(u64),
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match ColumnTypeRepr::deserialize(deserializer)? {
            ColumnTypeRepr::Name(name) => name.parse().map_err(serde::de::Error::custom),
            ColumnTypeRepr::Index(index) => Self::from_index(index).ok_or_else(|| {
                serde::de::Error::custom(format!("Unknown column type index: {}", index))
            }),
        }
    }
}

/// A selectable choice in a Single/Multi column.
///
/// The label doubles as the stored cell value, so renames go through
/// [`Tab::rename_option`](super::Tab::rename_option) to keep rows linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OptionItem {
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_option_color")]
    pub color: String,
}

fn default_option_color() -> String {
    DEFAULT_OPTION_COLOR.to_string()
}

impl OptionItem {
    pub fn new(label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: color.into(),
        }
    }
}

/// Column definition within a tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Column {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default = "default_column_name")]
    pub name: String,
    #[serde(rename = "Type", default = "default_column_type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub options: Vec<OptionItem>,
}

fn default_column_name() -> String {
    DEFAULT_COLUMN_NAME.to_string()
}

fn default_column_type() -> ColumnType {
    ColumnType::Text
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            column_type,
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<OptionItem>) -> Self {
        self.options = options;
        self
    }

    /// Look up an option by its label
    pub fn option(&self, label: &str) -> Option<&OptionItem> {
        self.options.iter().find(|o| o.label == label)
    }

    /// Check the option list against the column type.
    ///
    /// Choice columns may have any number of options (including none) but
    /// labels must be unique; every other type must carry no options.
    pub fn validate(&self) -> Result<()> {
        if !self.column_type.supports_options() {
            if !self.options.is_empty() {
                return Err(AppError::InvalidColumn(format!(
                    "{} column '{}' cannot carry options",
                    self.column_type, self.name
                )));
            }
            return Ok(());
        }

        let mut seen = HashSet::new();
        for option in &self.options {
            if !seen.insert(option.label.as_str()) {
                return Err(AppError::InvalidColumn(format!(
                    "duplicate option '{}' in column '{}'",
                    option.label, self.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for Column {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMN_NAME, ColumnType::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_serializes_as_name() {
        let json = serde_json::to_string(&ColumnType::TodoList).unwrap();
        assert_eq!(json, r#""TodoList""#);
    }

    #[test]
    fn test_column_type_accepts_legacy_index() {
        let ty: ColumnType = serde_json::from_str("1").unwrap();
        assert_eq!(ty, ColumnType::Single);

        let ty: ColumnType = serde_json::from_str("5").unwrap();
        assert_eq!(ty, ColumnType::TextArea);

        assert!(serde_json::from_str::<ColumnType>("6").is_err());
        assert!(serde_json::from_str::<ColumnType>(r#""Checkbox""#).is_err());
    }

    #[test]
    fn test_column_missing_fields_get_defaults() {
        let column: Column = serde_json::from_str(r#"{"Name":"Status"}"#).unwrap();
        assert_eq!(column.name, "Status");
        assert_eq!(column.column_type, ColumnType::Text);
        assert!(column.options.is_empty());
        assert!(!column.id.is_empty());
    }

    #[test]
    fn test_validate_rejects_options_on_text_column() {
        let column = Column::new("Task", ColumnType::Text)
            .with_options(vec![OptionItem::new("A", "#000000")]);
        assert!(matches!(column.validate(), Err(AppError::InvalidColumn(_))));
    }

    #[test]
    fn test_validate_allows_empty_choice_column() {
        let column = Column::new("Status", ColumnType::Single);
        assert!(column.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_labels() {
        let column = Column::new("Status", ColumnType::Single).with_options(vec![
            OptionItem::new("Done", "#388E3C"),
            OptionItem::new("Done", "#757575"),
        ]);
        assert!(column.validate().is_err());
    }
}
