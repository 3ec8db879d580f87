//! Documents, structures, and records
//!
//! A document is a named logical table. Its structure is an ordered set of
//! field definitions that the engine compares and merges but never uses to
//! convert values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Definition of a single field (column)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,

    /// Store-specific type name (e.g. `int`, `varchar`)
    #[serde(rename = "type", default = "default_data_type")]
    pub data_type: String,

    /// Whether the field accepts null
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Optional size/length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,

    /// Optional default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_data_type() -> String {
    "text".to_string()
}

fn default_nullable() -> bool {
    true
}

impl FieldDefinition {
    /// Create a nullable field of the given type
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            size: None,
            default: None,
        }
    }
}

/// Ordered field structure of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Structure {
    fields: Vec<FieldDefinition>,
}

impl Structure {
    /// Build a structure from field definitions, keeping the first definition
    /// of any duplicated name.
    pub fn new(fields: impl IntoIterator<Item = FieldDefinition>) -> Self {
        let mut structure = Self::default();
        for field in fields {
            if !structure.contains(&field.name) {
                structure.fields.push(field);
            }
        }
        structure
    }

    /// Whether a field with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Look up a field definition by name
    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in declaration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Field definitions in declaration order
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Insert a field, replacing an existing definition of the same name in place
    pub fn set(&mut self, field: FieldDefinition) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the structure has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Table definition exchanged with a store's DDL operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table (document) name
    pub name: String,

    /// Column definitions
    #[serde(default)]
    pub columns: Structure,
}

impl TableDefinition {
    /// An empty definition for a table that does not exist yet
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Structure::default(),
        }
    }

    /// Set a column, replacing any existing column of the same name
    pub fn set_column(&mut self, column: FieldDefinition) {
        self.columns.set(column);
    }
}

/// A named logical table as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    name: String,
    structure: Structure,
}

impl Document {
    /// Create a document
    pub fn new(name: impl Into<String>, structure: Structure) -> Self {
        Self {
            name: name.into(),
            structure,
        }
    }

    /// Document name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field structure
    pub fn structure(&self) -> &Structure {
        &self.structure
    }
}

impl From<TableDefinition> for Document {
    fn from(def: TableDefinition) -> Self {
        Self::new(def.name, def.columns)
    }
}

/// Returns true iff every field of `a` is also present in `b`.
///
/// The comparison is asymmetric: `b` may carry extra fields.
pub fn have_equal_structure(a: &Document, b: &Document) -> bool {
    a.structure()
        .field_names()
        .all(|name| b.structure().contains(name))
}

/// One row: field name to value, bound to a single document
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    document: String,
    data: Map<String, Value>,
}

impl Record {
    /// Create an empty record for a document
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            data: Map::new(),
        }
    }

    /// Create a record with data
    pub fn with_data(document: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            document: document.into(),
            data,
        }
    }

    /// Build a record from a JSON object value
    pub fn from_value(document: impl Into<String>, value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self::with_data(document, data)),
            _ => None,
        }
    }

    /// Name of the document this record belongs to
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Field value, if set
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Set a field value
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.data.insert(field.into(), value);
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.data.remove(field)
    }

    /// All field values
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Consume the record, returning its data
    pub fn into_data(self) -> Map<String, Value> {
        self.data
    }

    /// Materialize a new record for `document` carrying this record's values
    pub fn copy_to(&self, document: impl Into<String>) -> Record {
        Record::with_data(document, self.data.clone())
    }
}
