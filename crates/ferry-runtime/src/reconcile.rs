//! Destination schema reconciliation
//!
//! Before copying a document whose destination table may be missing columns,
//! the destination definition is widened with every source column. Columns
//! are only ever added or replaced, never dropped.

use ferry_core::document::{Document, TableDefinition};
use ferry_core::stores::Store;
use tracing::debug;

use crate::error::Result;

/// Merge `source`'s columns into the destination table and apply the DDL.
///
/// Starts from the destination's current definition (empty if the table
/// does not exist). A source column replaces a destination column of the
/// same name in place; new columns are appended in source order.
pub async fn reconcile(
    source: &Document,
    dest_document: &str,
    destination: &dyn Store,
) -> Result<TableDefinition> {
    let mut definition = destination
        .table_definition(dest_document)
        .await?
        .unwrap_or_else(|| TableDefinition::empty(dest_document));
    let before = definition.columns.len();

    for field in source.structure().fields() {
        definition.set_column(field.clone());
    }

    debug!(
        document = dest_document,
        existing_columns = before,
        columns = definition.columns.len(),
        "Reconciling destination schema"
    );
    destination.create_or_alter_table(&definition).await?;
    Ok(definition)
}
