//! Record transform pipeline
//!
//! A pipeline is bound to one (source document, destination document) pair.
//! It is built once per document and applied to every record of that
//! document:
//!
//! 1. source-side handlers run on a working copy of the source record
//! 2. surviving source fields are renamed and copied into a fresh
//!    destination record
//! 3. destination-side handlers run on the destination record

use tracing::debug;

use crate::document::{Document, Record};
use crate::error::Result;
use crate::mapping::{Direction, Mapping};
use crate::transforms::FieldHandler;

/// Field-level transform pipeline for one document pair
#[derive(Debug)]
pub struct TransformPipeline {
    source_document: String,
    dest_document: String,
    source_handlers: Vec<FieldHandler>,
    dest_handlers: Vec<FieldHandler>,
    copies: Vec<(String, String)>,
    transformed: u64,
}

impl TransformPipeline {
    /// Build the pipeline from the mapping rules of both documents
    pub fn build(source: &Document, dest: &Document, mapping: &Mapping) -> Result<Self> {
        let source_handlers = compile_handlers(source, mapping, Direction::Source)?;
        let dest_handlers = compile_handlers(dest, mapping, Direction::Dest)?;

        let copies: Vec<(String, String)> = source
            .structure()
            .field_names()
            .filter(|field| !mapping.is_field_ignored(source.name(), field, Direction::Source))
            .map(|field| (field, mapping.map_field(source.name(), field)))
            .filter(|(_, target)| {
                dest.structure().contains(target)
                    && !mapping.is_field_ignored(dest.name(), target, Direction::Dest)
            })
            .map(|(field, target)| (field.to_string(), target.to_string()))
            .collect();

        debug!(
            source = source.name(),
            dest = dest.name(),
            source_handlers = source_handlers.len(),
            dest_handlers = dest_handlers.len(),
            copied_fields = copies.len(),
            "Built transform pipeline"
        );

        Ok(Self {
            source_document: source.name().to_string(),
            dest_document: dest.name().to_string(),
            source_handlers,
            dest_handlers,
            copies,
            transformed: 0,
        })
    }

    /// Source document name
    pub fn source_document(&self) -> &str {
        &self.source_document
    }

    /// Destination document name
    pub fn dest_document(&self) -> &str {
        &self.dest_document
    }

    /// Number of records transformed so far
    pub fn transformed(&self) -> u64 {
        self.transformed
    }

    /// Convert one source record into a new destination record
    pub fn transform(&mut self, record: &Record) -> Result<Record> {
        let mut working = record.copy_to(self.source_document.as_str());
        for handler in &self.source_handlers {
            handler.handle(&mut working)?;
        }

        let mut output = Record::new(self.dest_document.as_str());
        for (from, to) in &self.copies {
            if let Some(value) = working.get(from) {
                output.set(to.clone(), value.clone());
            }
        }

        for handler in &self.dest_handlers {
            handler.handle(&mut output)?;
        }

        self.transformed += 1;
        Ok(output)
    }
}

fn compile_handlers(
    document: &Document,
    mapping: &Mapping,
    direction: Direction,
) -> Result<Vec<FieldHandler>> {
    document
        .structure()
        .field_names()
        .filter_map(|field| {
            mapping
                .handler_config(document.name(), field, direction)
                .map(|config| config.compile(document.name(), field))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FieldDefinition, Structure};
    use serde_json::json;

    fn doc(name: &str, fields: &[&str]) -> Document {
        Document::new(
            name,
            Structure::new(fields.iter().map(|f| FieldDefinition::new(*f, "text"))),
        )
    }

    const MAP: &str = r##"
source:
  documents:
    rename:
      sales_flat_order: sales_order
  fields:
    ignore: [sales_flat_order.legacy_flag]
    rename:
      sales_flat_order.customer_email_addr: sales_order.customer_email
    handlers:
      sales_flat_order.status:
        map_value:
          map: { canceled: cancelled }
destination:
  fields:
    ignore: [sales_order.grand_total]
    handlers:
      sales_order.created_via:
        set_value:
          value: migration
      sales_order.label:
        template: "#{{ entity_id }} ({{ status }})"
"##;

    fn pipeline() -> TransformPipeline {
        let mapping = Mapping::from_yaml(MAP).unwrap();
        let source = doc(
            "sales_flat_order",
            &[
                "entity_id",
                "status",
                "legacy_flag",
                "customer_email_addr",
                "grand_total",
            ],
        );
        let dest = doc(
            "sales_order",
            &[
                "entity_id",
                "status",
                "customer_email",
                "grand_total",
                "created_via",
                "label",
            ],
        );
        TransformPipeline::build(&source, &dest, &mapping).unwrap()
    }

    #[test]
    fn test_transform_applies_all_rules() {
        let mut pipeline = pipeline();
        let input = Record::from_value(
            "sales_flat_order",
            json!({
                "entity_id": 7,
                "status": "canceled",
                "legacy_flag": 1,
                "customer_email_addr": "a@example.com",
                "grand_total": 10.5
            }),
        )
        .unwrap();

        let output = pipeline.transform(&input).unwrap();

        assert_eq!(output.document(), "sales_order");
        assert_eq!(output.get("entity_id"), Some(&json!(7)));
        assert_eq!(output.get("status"), Some(&json!("cancelled")));
        assert_eq!(output.get("customer_email"), Some(&json!("a@example.com")));
        assert_eq!(output.get("created_via"), Some(&json!("migration")));
        assert_eq!(output.get("label"), Some(&json!("#7 (cancelled)")));
        assert!(output.get("legacy_flag").is_none());
        assert!(output.get("customer_email_addr").is_none());
        assert!(output.get("grand_total").is_none());
    }

    #[test]
    fn test_transform_leaves_source_untouched() {
        let mut pipeline = pipeline();
        let input = Record::from_value(
            "sales_flat_order",
            json!({"entity_id": 1, "status": "canceled"}),
        )
        .unwrap();
        pipeline.transform(&input).unwrap();
        assert_eq!(input.get("status"), Some(&json!("canceled")));
    }

    #[test]
    fn test_transform_counts_records() {
        let mut pipeline = pipeline();
        let input = Record::from_value("sales_flat_order", json!({"entity_id": 1})).unwrap();
        for _ in 0..3 {
            pipeline.transform(&input).unwrap();
        }
        assert_eq!(pipeline.transformed(), 3);
    }

    #[test]
    fn test_fields_missing_in_destination_are_dropped() {
        let mapping = Mapping::identity();
        let source = doc("a", &["id", "only_in_source"]);
        let dest = doc("a", &["id"]);
        let mut pipeline = TransformPipeline::build(&source, &dest, &mapping).unwrap();

        let input = Record::from_value("a", json!({"id": 1, "only_in_source": "x"})).unwrap();
        let output = pipeline.transform(&input).unwrap();
        assert_eq!(output.data().len(), 1);
        assert_eq!(output.get("id"), Some(&json!(1)));
    }
}
