//! Direct copy vs. transform pipeline decision
//!
//! A document pair can be copied verbatim when every source field exists in
//! the destination and no field on either side carries a handler. Anything
//! else goes through a [`TransformPipeline`].

use ferry_core::document::{Document, Record, have_equal_structure};
use ferry_core::mapping::{Direction, Mapping};
use ferry_core::pipeline::TransformPipeline;

use crate::error::Result;

/// How records of one document are copied
#[derive(Debug)]
pub enum CopyMode {
    /// Field values are copied by name
    Direct,
    /// Every record goes through the pipeline
    Transform(TransformPipeline),
}

impl CopyMode {
    /// Short name used in logs and plans
    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Transform(_) => "transform",
        }
    }

    /// Whether this is a direct copy
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }

    /// Produce a fresh destination record for `record`
    pub fn apply(&mut self, record: &Record, dest_document: &str) -> Result<Record> {
        match self {
            Self::Direct => Ok(record.copy_to(dest_document)),
            Self::Transform(pipeline) => Ok(pipeline.transform(record)?),
        }
    }
}

/// True when `source` can be copied into `dest` without a pipeline
pub fn can_direct_copy(source: &Document, dest: &Document, mapping: &Mapping) -> bool {
    have_equal_structure(source, dest)
        && !mapping.has_handlers(source, Direction::Source)
        && !mapping.has_handlers(dest, Direction::Dest)
}

/// Decide the copy mode, building the pipeline when one is needed
pub fn decide(source: &Document, dest: &Document, mapping: &Mapping) -> Result<CopyMode> {
    if can_direct_copy(source, dest, mapping) {
        Ok(CopyMode::Direct)
    } else {
        Ok(CopyMode::Transform(TransformPipeline::build(
            source, dest, mapping,
        )?))
    }
}
