//! Declarative document and field mapping
//!
//! A mapping file describes how source documents and fields relate to
//! destination documents and fields. Anything not mentioned maps to itself.
//!
//! # Format
//!
//! ```yaml
//! source:
//!   documents:
//!     ignore: [log_*]
//!     rename:
//!       sales_flat_order: sales_order
//!   fields:
//!     ignore: [sales_flat_order.legacy_flag]
//!     rename:
//!       sales_flat_order.customer_email_addr: sales_order.customer_email
//!     handlers:
//!       sales_flat_order.status:
//!         map_value:
//!           map: { canceled: cancelled }
//! destination:
//!   fields:
//!     handlers:
//!       sales_order.created_via:
//!         set_value:
//!           value: migration
//! ```
//!
//! Ignore entries accept `*` wildcards.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::transforms::HandlerConfig;

/// Which side of the migration a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Rules keyed by source document/field names
    Source,
    /// Rules keyed by destination document/field names
    Dest,
}

/// Raw mapping file as written in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingFile {
    /// Rules keyed by source names
    #[serde(default)]
    pub source: SideRules,

    /// Rules keyed by destination names
    #[serde(default)]
    pub destination: SideRules,
}

/// Rules for one side of the mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideRules {
    /// Document-level rules
    #[serde(default)]
    pub documents: DocumentRules,

    /// Field-level rules (`document.field` keys)
    #[serde(default)]
    pub fields: FieldRules,
}

/// Document-level rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRules {
    /// Documents excluded from migration
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Document renames: this side's name -> other side's name
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
}

/// Field-level rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRules {
    /// Fields excluded from copying (`document.field`)
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Field renames (`document.field` -> `document.field`)
    #[serde(default)]
    pub rename: BTreeMap<String, String>,

    /// Field handlers (`document.field` -> handler)
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
}

#[derive(Debug, Default)]
struct CompiledSide {
    ignored_documents: Vec<Regex>,
    document_rename: HashMap<String, String>,
    ignored_fields: Vec<Regex>,
    field_rename: HashMap<(String, String), String>,
    handlers: HashMap<(String, String), HandlerConfig>,
}

impl CompiledSide {
    fn compile(rules: &SideRules) -> Result<Self> {
        let ignored_documents = rules
            .documents
            .ignore
            .iter()
            .map(String::as_str)
            .map(wildcard)
            .collect::<Result<_>>()?;
        let ignored_fields = rules
            .fields
            .ignore
            .iter()
            .map(|p| {
                split_field_key(p)?;
                wildcard(p)
            })
            .collect::<Result<_>>()?;

        let mut field_rename = HashMap::new();
        for (from, to) in &rules.fields.rename {
            let (doc, field) = split_field_key(from)?;
            let (_, to_field) = split_field_key(to)?;
            field_rename.insert((doc.to_string(), field.to_string()), to_field.to_string());
        }

        let mut handlers = HashMap::new();
        for (key, handler) in &rules.fields.handlers {
            let (doc, field) = split_field_key(key)?;
            handlers.insert((doc.to_string(), field.to_string()), handler.clone());
        }

        Ok(Self {
            ignored_documents,
            document_rename: rules
                .documents
                .rename
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ignored_fields,
            field_rename,
            handlers,
        })
    }

    fn is_document_ignored(&self, name: &str) -> bool {
        self.ignored_documents.iter().any(|r| r.is_match(name))
    }

    fn is_field_ignored(&self, document: &str, field: &str) -> bool {
        let key = format!("{}.{}", document, field);
        self.ignored_fields.iter().any(|r| r.is_match(&key))
    }
}

/// Compiled mapping used to resolve names and handlers
#[derive(Debug, Default)]
pub struct Mapping {
    source: CompiledSide,
    destination: CompiledSide,
    fingerprint: String,
}

impl Mapping {
    /// A mapping with no rules: every document and field maps to itself
    pub fn identity() -> Self {
        Self {
            fingerprint: fingerprint(""),
            ..Default::default()
        }
    }

    /// Load a mapping file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a mapping from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let file: MappingFile = if contents.trim().is_empty() {
            MappingFile::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        let mut mapping = Self::from_file(&file)?;
        mapping.fingerprint = fingerprint(contents);
        Ok(mapping)
    }

    /// Compile an already-parsed mapping file
    pub fn from_file(file: &MappingFile) -> Result<Self> {
        Ok(Self {
            source: CompiledSide::compile(&file.source)?,
            destination: CompiledSide::compile(&file.destination)?,
            fingerprint: fingerprint(&serde_yaml::to_string(file)?),
        })
    }

    /// SHA-256 of the mapping text, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn side(&self, direction: Direction) -> &CompiledSide {
        match direction {
            Direction::Source => &self.source,
            Direction::Dest => &self.destination,
        }
    }

    /// Destination document name for a source document.
    ///
    /// Returns `None` when the document is ignored, which means it is not
    /// migrated at all.
    pub fn resolve_destination_name(&self, source_document: &str) -> Option<String> {
        if self.source.is_document_ignored(source_document) {
            return None;
        }
        Some(
            self.source
                .document_rename
                .get(source_document)
                .cloned()
                .unwrap_or_else(|| source_document.to_string()),
        )
    }

    /// Source document name for a destination document (reverse lookup)
    pub fn resolve_source_name(&self, dest_document: &str) -> Option<String> {
        if self.destination.is_document_ignored(dest_document) {
            return None;
        }
        if let Some(renamed) = self.destination.document_rename.get(dest_document) {
            return Some(renamed.clone());
        }
        let mut sources = self
            .source
            .document_rename
            .iter()
            .filter(|(_, to)| to.as_str() == dest_document)
            .map(|(from, _)| from.clone());
        Some(sources.next().unwrap_or_else(|| dest_document.to_string()))
    }

    /// Handler configured for a field, if any
    pub fn handler_config(
        &self,
        document: &str,
        field: &str,
        direction: Direction,
    ) -> Option<&HandlerConfig> {
        self.side(direction)
            .handlers
            .get(&(document.to_string(), field.to_string()))
    }

    /// Whether any field of `document` has a handler in `direction`
    pub fn has_handlers(&self, document: &Document, direction: Direction) -> bool {
        document
            .structure()
            .field_names()
            .any(|field| self.handler_config(document.name(), field, direction).is_some())
    }

    /// Whether a field is excluded from copying
    pub fn is_field_ignored(&self, document: &str, field: &str, direction: Direction) -> bool {
        self.side(direction).is_field_ignored(document, field)
    }

    /// Destination field name for a source field
    pub fn map_field<'a>(&'a self, source_document: &str, field: &'a str) -> &'a str {
        self.source
            .field_rename
            .get(&(source_document.to_string(), field.to_string()))
            .map(String::as_str)
            .unwrap_or(field)
    }
}

fn split_field_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('.')
        .filter(|(doc, field)| !doc.is_empty() && !field.is_empty())
        .ok_or_else(|| Error::Mapping {
            rule: key.to_string(),
            message: "field rules must be written as 'document.field'".to_string(),
        })
}

fn wildcard(pattern: &str) -> Result<Regex> {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("^{}$", escaped.join(".*"))).map_err(|e| Error::Mapping {
        rule: pattern.to_string(),
        message: e.to_string(),
    })
}

fn fingerprint(contents: &str) -> String {
    hex::encode(Sha256::digest(contents.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FieldDefinition, Structure};

    const MAP: &str = r#"
source:
  documents:
    ignore: [log_*, core_cache]
    rename:
      sales_flat_order: sales_order
  fields:
    ignore: [sales_flat_order.legacy_flag, "*.updated_by"]
    rename:
      sales_flat_order.customer_email_addr: sales_order.customer_email
    handlers:
      sales_flat_order.status:
        map_value:
          map: { canceled: cancelled }
destination:
  documents:
    ignore: [sales_order_grid]
  fields:
    ignore: [sales_order.send_email]
    handlers:
      sales_order.created_via:
        set_value:
          value: migration
"#;

    fn doc(name: &str, fields: &[&str]) -> Document {
        Document::new(
            name,
            Structure::new(fields.iter().map(|f| FieldDefinition::new(*f, "text"))),
        )
    }

    #[test]
    fn test_resolve_destination_name() {
        let mapping = Mapping::from_yaml(MAP).unwrap();
        assert_eq!(
            mapping.resolve_destination_name("sales_flat_order"),
            Some("sales_order".to_string())
        );
        assert_eq!(
            mapping.resolve_destination_name("customer_entity"),
            Some("customer_entity".to_string())
        );
        assert_eq!(mapping.resolve_destination_name("core_cache"), None);
    }

    #[test]
    fn test_ignore_wildcard() {
        let mapping = Mapping::from_yaml(MAP).unwrap();
        assert_eq!(mapping.resolve_destination_name("log_visitor"), None);
        assert_eq!(mapping.resolve_destination_name("log_"), None);
        assert!(mapping.resolve_destination_name("catalog_log").is_some());
    }

    #[test]
    fn test_resolve_source_name() {
        let mapping = Mapping::from_yaml(MAP).unwrap();
        assert_eq!(
            mapping.resolve_source_name("sales_order"),
            Some("sales_flat_order".to_string())
        );
        assert_eq!(mapping.resolve_source_name("sales_order_grid"), None);
        assert_eq!(
            mapping.resolve_source_name("store"),
            Some("store".to_string())
        );
    }

    #[test]
    fn test_handler_config_by_direction() {
        let mapping = Mapping::from_yaml(MAP).unwrap();
        assert!(
            mapping
                .handler_config("sales_flat_order", "status", Direction::Source)
                .is_some()
        );
        assert!(
            mapping
                .handler_config("sales_flat_order", "status", Direction::Dest)
                .is_none()
        );
        assert!(
            mapping
                .handler_config("sales_order", "created_via", Direction::Dest)
                .is_some()
        );
    }

    #[test]
    fn test_has_handlers() {
        let mapping = Mapping::from_yaml(MAP).unwrap();
        let source = doc("sales_flat_order", &["entity_id", "status"]);
        let plain = doc("sales_flat_order", &["entity_id"]);
        let dest = doc("sales_order", &["entity_id", "created_via"]);

        assert!(mapping.has_handlers(&source, Direction::Source));
        assert!(!mapping.has_handlers(&plain, Direction::Source));
        assert!(mapping.has_handlers(&dest, Direction::Dest));
        assert!(!mapping.has_handlers(&dest, Direction::Source));
    }

    #[test]
    fn test_field_rules() {
        let mapping = Mapping::from_yaml(MAP).unwrap();
        assert!(mapping.is_field_ignored("sales_flat_order", "legacy_flag", Direction::Source));
        assert!(mapping.is_field_ignored("customer", "updated_by", Direction::Source));
        assert!(!mapping.is_field_ignored("sales_flat_order", "status", Direction::Source));
        assert!(mapping.is_field_ignored("sales_order", "send_email", Direction::Dest));
        assert_eq!(
            mapping.map_field("sales_flat_order", "customer_email_addr"),
            "customer_email"
        );
        assert_eq!(mapping.map_field("sales_flat_order", "status"), "status");
    }

    #[test]
    fn test_identity_mapping() {
        let mapping = Mapping::identity();
        assert_eq!(
            mapping.resolve_destination_name("anything"),
            Some("anything".to_string())
        );
        assert!(!mapping.has_handlers(&doc("anything", &["id"]), Direction::Source));
    }

    #[test]
    fn test_empty_yaml_is_identity() {
        let mapping = Mapping::from_yaml("   \n").unwrap();
        assert_eq!(mapping.resolve_destination_name("a"), Some("a".to_string()));
    }

    #[test]
    fn test_invalid_field_key() {
        let yaml = r#"
source:
  fields:
    ignore: [no_dot_here]
"#;
        let err = Mapping::from_yaml(yaml).unwrap_err().to_string();
        assert!(err.contains("no_dot_here"));
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = Mapping::from_yaml(MAP).unwrap();
        let b = Mapping::from_yaml("source: {}").unwrap();
        assert_eq!(a.fingerprint().len(), 64);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Mapping::load("/nonexistent/map.yaml");
        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }
}
