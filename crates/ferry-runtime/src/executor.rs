//! Paginated step executor
//!
//! For every document of a step, in order:
//!
//! 1. resolve the destination name (unresolved documents are skipped)
//! 2. skip documents already recorded in progress (resumable steps)
//! 3. reconcile the destination schema (if enabled)
//! 4. clear the destination document (resumable steps)
//! 5. decide between direct copy and a transform pipeline (if enabled)
//! 6. page through the source until an empty page, saving one batch per page
//! 7. record the document as processed (resumable steps)
//!
//! Work is strictly sequential. Cancellation is checked between documents
//! only, so a document is never left half-copied by a cancel request.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ferry_core::config::ReportingMode;
use ferry_core::progress::ProgressStore;
use ferry_core::stores::Store;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::decision::{CopyMode, decide};
use crate::error::{Error, Result};
use crate::reconcile::reconcile;
use crate::reporter::{NoopReporter, ProgressReporter};
use crate::steps::Step;

/// Outcome of one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Step name
    pub step: String,
    /// Stage name
    pub stage: String,
    /// Documents fully copied in this run
    pub documents_migrated: u64,
    /// Documents without a destination
    pub skipped_unresolved: u64,
    /// Documents already recorded in progress
    pub skipped_processed: u64,
    /// Migrated documents copied directly
    pub direct_copies: u64,
    /// Migrated documents copied through a pipeline
    pub transformed: u64,
    /// Records saved to the destination
    pub records_written: u64,
    /// Source page fetches, including the terminating empty page
    pub pages_read: u64,
    /// Wall time of the step
    pub duration: Duration,
}

impl StepReport {
    fn new(step: &Step) -> Self {
        Self {
            step: step.name.clone(),
            stage: step.stage.clone(),
            ..Default::default()
        }
    }
}

/// What a run would do with one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    /// No destination; skipped
    Unresolved,
    /// Already recorded in progress; skipped
    AlreadyProcessed,
    /// Copied field by field
    Direct,
    /// Copied through a transform pipeline
    Transform,
    /// Destination table created or widened, then copied directly
    Reconcile,
    /// Destination table does not exist; the run would fail
    MissingDestination,
}

/// One line of a step plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDocument {
    /// Source document
    pub source: String,
    /// Destination document, if resolved
    pub destination: Option<String>,
    /// Planned action
    pub action: PlannedAction,
}

/// Runs steps against a source and destination store
pub struct StepExecutor {
    source: Arc<dyn Store>,
    destination: Arc<dyn Store>,
    progress: Arc<dyn ProgressStore>,
    reporter: Box<dyn ProgressReporter>,
    reporting: ReportingMode,
}

impl StepExecutor {
    /// Create an executor that does not report progress
    pub fn new(
        source: Arc<dyn Store>,
        destination: Arc<dyn Store>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            source,
            destination,
            progress,
            reporter: Box::new(NoopReporter),
            reporting: ReportingMode::Off,
        }
    }

    /// Report progress at the given granularity
    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>, mode: ReportingMode) -> Self {
        self.reporter = reporter;
        self.reporting = mode;
        self
    }

    /// Run one step to completion.
    ///
    /// Any store, DDL, transform or progress error aborts the step. Documents
    /// recorded before the failure stay recorded.
    pub async fn run(&mut self, step: &Step, cancel: &watch::Receiver<bool>) -> Result<StepReport> {
        // A zero page size only ever yields empty pages
        if self.source.page_size() == 0 {
            return Err(ferry_core::Error::ConfigInvalid {
                message: format!("store '{}' has a page size of zero", self.source.name()),
            }
            .into());
        }

        let started = Instant::now();
        let mut report = StepReport::new(step);

        let documents = step.documents(self.source.as_ref()).await?;
        let processed = if step.resumable {
            self.progress
                .processed_entities(&step.name, &step.stage)
                .await?
        } else {
            BTreeSet::new()
        };

        info!(
            step = %step.name,
            stage = %step.stage,
            documents = documents.len(),
            already_processed = processed.len(),
            resumable = step.resumable,
            mapping = %step.mapping.fingerprint(),
            "Starting step"
        );

        let per_document = self.reporting == ReportingMode::Documents;
        if per_document {
            self.reporter.start(&step.name, documents.len() as u64);
        }

        for name in &documents {
            if *cancel.borrow() {
                warn!(step = %step.name, next_document = %name, "Cancellation requested, stopping");
                return Err(Error::Cancelled {
                    step: step.name.clone(),
                });
            }

            if let Err(e) = self.migrate_document(step, name, &processed, &mut report).await {
                error!(step = %step.name, document = %name, error = %e, "Document migration failed");
                return Err(e);
            }

            if per_document {
                self.reporter.advance();
            }
        }

        if per_document {
            self.reporter.finish();
        }

        report.duration = started.elapsed();
        info!(
            step = %step.name,
            migrated = report.documents_migrated,
            skipped = report.skipped_unresolved + report.skipped_processed,
            records = report.records_written,
            duration = ?report.duration,
            "Step complete"
        );
        Ok(report)
    }

    async fn migrate_document(
        &mut self,
        step: &Step,
        name: &str,
        processed: &BTreeSet<String>,
        report: &mut StepReport,
    ) -> Result<()> {
        let Some(dest_name) = step.mapping.resolve_destination_name(name) else {
            debug!(document = %name, "No destination document; skipping");
            report.skipped_unresolved += 1;
            return Ok(());
        };

        if step.resumable && processed.contains(name) {
            debug!(document = %name, "Already processed; skipping");
            report.skipped_processed += 1;
            return Ok(());
        }

        let source_doc = self.source.document(name).await?;

        if step.reconcile_schema {
            reconcile(&source_doc, &dest_name, self.destination.as_ref()).await?;
        }

        if step.resumable {
            self.destination.clear_document(&dest_name).await?;
        }

        let mut mode = if step.resolve_transforms {
            let dest_doc = self.destination.document(&dest_name).await?;
            decide(&source_doc, &dest_doc, &step.mapping)?
        } else {
            CopyMode::Direct
        };

        info!(
            source = %name,
            destination = %dest_name,
            mode = mode.label(),
            "Migrating document"
        );

        let per_record = self.reporting == ReportingMode::Records;
        if per_record {
            let total = self.source.record_count(name).await?;
            self.reporter.start(name, total);
        }

        let mut page = 0;
        loop {
            let records = self.source.records_page(name, page).await?;
            report.pages_read += 1;
            if records.is_empty() {
                break;
            }

            let mut batch = Vec::with_capacity(records.len());
            for record in &records {
                batch.push(mode.apply(record, &dest_name)?);
                if per_record {
                    self.reporter.advance();
                }
            }

            let written = batch.len() as u64;
            self.destination.save_records(&dest_name, batch).await?;
            report.records_written += written;
            debug!(document = %name, page, records = written, "Saved page");
            page += 1;
        }

        if per_record {
            self.reporter.finish();
        }

        if step.resumable {
            self.progress
                .add_processed_entity(&step.name, &step.stage, name)
                .await?;
        }

        report.documents_migrated += 1;
        match mode {
            CopyMode::Direct => report.direct_copies += 1,
            CopyMode::Transform(_) => report.transformed += 1,
        }
        Ok(())
    }

    /// Describe what [`run`](Self::run) would do, without writing anything
    pub async fn plan(&self, step: &Step) -> Result<Vec<PlannedDocument>> {
        let documents = step.documents(self.source.as_ref()).await?;
        let processed = if step.resumable {
            self.progress
                .processed_entities(&step.name, &step.stage)
                .await?
        } else {
            BTreeSet::new()
        };

        let mut plan = Vec::with_capacity(documents.len());
        for name in documents {
            let destination = step.mapping.resolve_destination_name(&name);
            let action = match &destination {
                None => PlannedAction::Unresolved,
                Some(_) if step.resumable && processed.contains(&name) => {
                    PlannedAction::AlreadyProcessed
                }
                Some(dest_name) => self.plan_document(step, &name, dest_name).await?,
            };
            plan.push(PlannedDocument {
                source: name,
                destination,
                action,
            });
        }
        Ok(plan)
    }

    async fn plan_document(&self, step: &Step, name: &str, dest_name: &str) -> Result<PlannedAction> {
        let source_doc = self.source.document(name).await?;
        let dest_def = self.destination.table_definition(dest_name).await?;

        if step.reconcile_schema {
            let widened = dest_def.as_ref().is_none_or(|def| {
                source_doc
                    .structure()
                    .fields()
                    .iter()
                    .any(|f| def.columns.get(&f.name) != Some(f))
            });
            if widened {
                return Ok(PlannedAction::Reconcile);
            }
        }

        let Some(dest_def) = dest_def else {
            return Ok(PlannedAction::MissingDestination);
        };

        if !step.resolve_transforms {
            return Ok(PlannedAction::Direct);
        }
        Ok(
            match decide(&source_doc, &dest_def.into(), &step.mapping)? {
                CopyMode::Direct => PlannedAction::Direct,
                CopyMode::Transform(_) => PlannedAction::Transform,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::document::{FieldDefinition, Structure, TableDefinition};
    use ferry_core::mapping::Mapping;
    use ferry_core::progress::MemoryProgress;
    use ferry_core::stores::{MemoryStore, StoreCall};
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn definition(name: &str, fields: &[&str]) -> TableDefinition {
        TableDefinition {
            name: name.to_string(),
            columns: Structure::new(fields.iter().map(|f| FieldDefinition::new(*f, "text"))),
        }
    }

    fn rows(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"id": i, "name": format!("n{}", i)})).collect()
    }

    fn not_cancelled() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    struct Harness {
        source: Arc<MemoryStore>,
        destination: Arc<MemoryStore>,
        progress: Arc<MemoryProgress>,
    }

    impl Harness {
        fn new(page_size: usize) -> Self {
            Self {
                source: Arc::new(MemoryStore::new("source", page_size)),
                destination: Arc::new(MemoryStore::new("destination", page_size)),
                progress: Arc::new(MemoryProgress::new()),
            }
        }

        fn executor(&self) -> StepExecutor {
            StepExecutor::new(
                self.source.clone(),
                self.destination.clone(),
                self.progress.clone(),
            )
        }

        fn source_page_calls(&self, document: &str) -> usize {
            self.source
                .calls()
                .iter()
                .filter(|c| matches!(c, StoreCall::RecordsPage(d, _) if d == document))
                .count()
        }
    }

    const SALES_MAP: &str = r#"
source:
  documents:
    ignore: [log_*]
    rename:
      sales_flat_order: sales_order
  fields:
    handlers:
      sales_flat_order.status:
        map_value:
          map: { canceled: cancelled }
"#;

    #[tokio::test]
    async fn test_sales_order_direct_copy() {
        let h = Harness::new(2);
        h.source.insert_table(
            definition("sales_order", &["id", "name"]),
            rows(5),
        );
        h.destination
            .insert_table(definition("sales_order", &["id", "name", "extra"]), vec![]);

        let step = Step::new("data", Mapping::identity());
        let report = h.executor().run(&step, &not_cancelled()).await.unwrap();

        assert_eq!(report.documents_migrated, 1);
        assert_eq!(report.direct_copies, 1);
        assert_eq!(report.transformed, 0);
        assert_eq!(report.records_written, 5);
        // three full-or-partial pages plus the terminating empty page
        assert_eq!(report.pages_read, 4);

        let copied: Vec<_> = h.destination.records("sales_order").iter().map(|r| r.data().clone()).collect();
        let original: Vec<_> = h.source.records("sales_order").iter().map(|r| r.data().clone()).collect();
        assert_eq!(copied, original);

        let saves: Vec<_> = h
            .destination
            .calls()
            .into_iter()
            .filter(|c| matches!(c, StoreCall::Save(..)))
            .collect();
        assert_eq!(
            saves,
            vec![
                StoreCall::Save("sales_order".into(), 2),
                StoreCall::Save("sales_order".into(), 2),
                StoreCall::Save("sales_order".into(), 1),
            ]
        );
        let done = h.progress.processed_entities("data", "run").await.unwrap();
        assert!(done.contains("sales_order"));
    }

    #[rstest]
    #[case(0, 3, 1)]
    #[case(1, 3, 2)]
    #[case(3, 3, 2)]
    #[case(4, 3, 3)]
    #[case(10, 1, 11)]
    #[tokio::test]
    async fn test_page_fetches(#[case] records: usize, #[case] page_size: usize, #[case] fetches: usize) {
        let h = Harness::new(page_size);
        h.source.insert_table(definition("t", &["id", "name"]), rows(records));
        h.destination.insert_table(definition("t", &["id", "name"]), vec![]);

        let report = h
            .executor()
            .run(&Step::new("data", Mapping::identity()), &not_cancelled())
            .await
            .unwrap();

        assert_eq!(h.source_page_calls("t"), fetches);
        assert_eq!(report.pages_read, fetches as u64);
        assert_eq!(h.destination.records("t").len(), records);
        let saves = h
            .destination
            .calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Save(..)))
            .count();
        assert_eq!(saves, records.div_ceil(page_size));
    }

    #[tokio::test]
    async fn test_transform_pipeline_invoked_per_record() {
        let h = Harness::new(2);
        h.source.insert_table(
            definition("sales_flat_order", &["id", "status"]),
            vec![
                json!({"id": 1, "status": "canceled"}),
                json!({"id": 2, "status": "complete"}),
                json!({"id": 3, "status": "canceled"}),
            ],
        );
        h.source.insert_table(definition("log_visitor", &["id"]), rows(2));
        h.destination
            .insert_table(definition("sales_order", &["id", "status"]), vec![]);

        let step = Step::new("data", Mapping::from_yaml(SALES_MAP).unwrap());
        let report = h.executor().run(&step, &not_cancelled()).await.unwrap();

        assert_eq!(report.transformed, 1);
        assert_eq!(report.skipped_unresolved, 1);
        assert_eq!(report.records_written, 3);
        let statuses: Vec<_> = h
            .destination
            .records("sales_order")
            .iter()
            .map(|r| r.get("status").cloned())
            .collect();
        assert_eq!(
            statuses,
            vec![
                Some(json!("cancelled")),
                Some(json!("complete")),
                Some(json!("cancelled"))
            ]
        );
        assert_eq!(h.source_page_calls("log_visitor"), 0);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let h = Harness::new(2);
        h.source.insert_table(definition("a", &["id", "name"]), rows(3));
        h.source.insert_table(definition("b", &["id", "name"]), rows(1));
        h.destination.insert_table(definition("a", &["id", "name"]), vec![]);
        h.destination.insert_table(definition("b", &["id", "name"]), vec![]);
        let step = Step::new("data", Mapping::identity());

        h.executor().run(&step, &not_cancelled()).await.unwrap();
        let after_first = (h.destination.records("a"), h.destination.records("b"));
        let calls_before = h.source.calls().len();

        let report = h.executor().run(&step, &not_cancelled()).await.unwrap();

        assert_eq!(report.skipped_processed, 2);
        assert_eq!(report.documents_migrated, 0);
        assert_eq!(
            (h.destination.records("a"), h.destination.records("b")),
            after_first
        );
        assert_eq!(h.source.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_resume_skips_processed_without_store_calls() {
        let h = Harness::new(10);
        h.source.insert_table(definition("done", &["id"]), rows(2));
        h.source.insert_table(definition("todo", &["id", "name"]), rows(2));
        h.destination.insert_table(definition("done", &["id"]), vec![]);
        h.destination.insert_table(definition("todo", &["id", "name"]), vec![json!({"id": 99})]);
        h.progress.add_processed_entity("data", "run", "done").await.unwrap();

        let step = Step::new("data", Mapping::identity());
        let report = h.executor().run(&step, &not_cancelled()).await.unwrap();

        assert_eq!(report.skipped_processed, 1);
        assert!(h.source.calls().iter().all(|c| c.document() != "done"));
        assert!(h.destination.calls().iter().all(|c| c.document() != "done"));
        // the partially written destination is cleared before repopulating
        assert_eq!(h.destination.records("todo").len(), 2);
        assert_eq!(h.destination.calls()[0], StoreCall::Clear("todo".into()));
    }

    #[tokio::test]
    async fn test_progress_is_per_stage() {
        let h = Harness::new(10);
        h.source.insert_table(definition("a", &["id"]), rows(1));
        h.destination.insert_table(definition("a", &["id"]), vec![]);
        h.progress.add_processed_entity("data", "run", "a").await.unwrap();

        let step = Step::new("data", Mapping::identity()).with_stage("delta");
        let report = h.executor().run(&step, &not_cancelled()).await.unwrap();
        assert_eq!(report.documents_migrated, 1);
        assert!(h.progress.processed_entities("data", "delta").await.unwrap().contains("a"));
    }

    #[tokio::test]
    async fn test_customer_attribute_table_is_created_and_copied() {
        let h = Harness::new(2);
        h.source.insert_table(
            TableDefinition {
                name: "customer_attr_x".to_string(),
                columns: Structure::new([
                    FieldDefinition::new("entity_id", "int"),
                    FieldDefinition::new("attribute_id", "smallint"),
                    FieldDefinition::new("value", "varchar"),
                ]),
            },
            vec![
                json!({"entity_id": 1, "attribute_id": 200, "value": "a"}),
                json!({"entity_id": 2, "attribute_id": 200, "value": "b"}),
                json!({"entity_id": 3, "attribute_id": 200, "value": "c"}),
            ],
        );

        let step = Step::attributes(
            "customer_attributes",
            Mapping::identity(),
            vec!["customer_attr_x".into()],
        );
        let report = h.executor().run(&step, &not_cancelled()).await.unwrap();

        let created = h.destination.table_definition("customer_attr_x").await.unwrap().unwrap();
        assert_eq!(
            created.columns.field_names().collect::<Vec<_>>(),
            vec!["entity_id", "attribute_id", "value"]
        );
        assert_eq!(h.destination.records("customer_attr_x"), h.source.records("customer_attr_x"));
        assert_eq!(report.direct_copies, 1);
        assert!(h.progress.processed_entities("customer_attributes", "run").await.unwrap().is_empty());
        assert!(!h
            .destination
            .calls()
            .iter()
            .any(|c| matches!(c, StoreCall::Clear(_))));
    }

    #[tokio::test]
    async fn test_attribute_step_widens_existing_table() {
        let h = Harness::new(10);
        h.source.insert_table(definition("attrs", &["id", "new_col"]), vec![json!({"id": 1, "new_col": "x"})]);
        h.destination.insert_table(definition("attrs", &["id", "legacy"]), vec![json!({"id": 0, "legacy": "y"})]);

        let step = Step::attributes("attrs", Mapping::identity(), vec!["attrs".into()]);
        h.executor().run(&step, &not_cancelled()).await.unwrap();

        let def = h.destination.table_definition("attrs").await.unwrap().unwrap();
        assert_eq!(def.columns.field_names().collect::<Vec<_>>(), vec!["id", "legacy", "new_col"]);
        assert_eq!(h.destination.records("attrs").len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_and_keeps_earlier_progress() {
        let h = Harness::new(10);
        for name in ["a", "b", "c"] {
            h.source.insert_table(definition(name, &["id"]), rows(1));
            h.destination.insert_table(definition(name, &["id"]), vec![]);
        }
        h.destination.fail_saves("b");

        let step = Step::new("data", Mapping::identity());
        let result = h.executor().run(&step, &not_cancelled()).await;

        assert!(matches!(
            result,
            Err(Error::Core(ferry_core::Error::Store { .. }))
        ));
        let done = h.progress.processed_entities("data", "run").await.unwrap();
        assert_eq!(done.into_iter().collect::<Vec<_>>(), vec!["a".to_string()]);
        assert!(h.source.calls().iter().all(|c| c.document() != "c"));
    }

    #[tokio::test]
    async fn test_ddl_failure_aborts_attribute_step() {
        let h = Harness::new(10);
        h.source.insert_table(definition("x", &["id"]), rows(1));
        h.destination.fail_ddl("x");

        let step = Step::attributes("attrs", Mapping::identity(), vec!["x".into()]);
        let result = h.executor().run(&step, &not_cancelled()).await;
        assert!(result.is_err());
        assert_eq!(h.source_page_calls("x"), 0);
    }

    #[tokio::test]
    async fn test_transform_failure_aborts() {
        let h = Harness::new(10);
        h.source.insert_table(definition("t", &["id"]), rows(1));
        h.destination.insert_table(definition("t", &["id", "label"]), vec![]);
        let mapping = Mapping::from_yaml(
            r#"
destination:
  fields:
    handlers:
      t.label:
        template: "{{ id | no_such_filter }}"
"#,
        )
        .unwrap();
        let step = Step::new("data", mapping);
        let result = h.executor().run(&step, &not_cancelled()).await;
        assert!(result.is_err());
        assert!(h.destination.records("t").is_empty());
        assert!(h.progress.processed_entities("data", "run").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_document_boundary() {
        let h = Harness::new(10);
        h.source.insert_table(definition("a", &["id"]), rows(1));
        h.destination.insert_table(definition("a", &["id"]), vec![]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let result = h
            .executor()
            .run(&Step::new("data", Mapping::identity()), &rx)
            .await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert!(h.source.calls().is_empty());
    }

    struct CancelOnAdvance(watch::Sender<bool>);

    impl ProgressReporter for CancelOnAdvance {
        fn start(&mut self, _label: &str, _total: u64) {}
        fn advance(&mut self) {
            self.0.send_replace(true);
        }
        fn finish(&mut self) {}
    }

    #[tokio::test]
    async fn test_cancellation_mid_document_finishes_current_document() {
        let h = Harness::new(1);
        h.source.insert_table(definition("a", &["id", "name"]), rows(3));
        h.source.insert_table(definition("b", &["id", "name"]), rows(2));
        h.destination.insert_table(definition("a", &["id", "name"]), vec![]);
        h.destination.insert_table(definition("b", &["id", "name"]), vec![]);
        let (tx, rx) = watch::channel(false);

        let result = h
            .executor()
            .with_reporter(Box::new(CancelOnAdvance(tx)), ReportingMode::Records)
            .run(&Step::new("data", Mapping::identity()), &rx)
            .await;

        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(h.destination.records("a").len(), 3);
        assert_eq!(h.source_page_calls("a"), 4);
        let done = h.progress.processed_entities("data", "run").await.unwrap();
        assert!(done.contains("a"));
        assert!(!done.contains("b"));
        assert_eq!(h.source_page_calls("b"), 0);
        assert!(h.destination.records("b").is_empty());
    }

    #[tokio::test]
    async fn test_zero_page_size_is_rejected() {
        let h = Harness::new(0);
        h.source.insert_table(definition("t", &["id", "name"]), rows(2));
        h.destination.insert_table(definition("t", &["id", "name"]), vec![]);

        let result = h
            .executor()
            .run(&Step::new("data", Mapping::identity()), &not_cancelled())
            .await;

        assert!(matches!(
            result,
            Err(Error::Core(ferry_core::Error::ConfigInvalid { .. }))
        ));
        assert!(h.source.calls().is_empty());
        assert!(h.progress.processed_entities("data", "run").await.unwrap().is_empty());
        assert!(h.destination.records("t").is_empty());
    }

    #[tokio::test]
    async fn test_missing_destination_fails_mapping_step() {
        let h = Harness::new(10);
        h.source.insert_table(definition("orphan", &["id"]), rows(1));

        let result = h
            .executor()
            .run(&Step::new("data", Mapping::identity()), &not_cancelled())
            .await;
        assert!(matches!(
            result,
            Err(Error::Core(ferry_core::Error::DocumentNotFound { .. }))
        ));
    }

    #[derive(Default)]
    struct Recorded {
        events: Vec<String>,
    }

    struct RecordingReporter(Arc<Mutex<Recorded>>);

    impl ProgressReporter for RecordingReporter {
        fn start(&mut self, label: &str, total: u64) {
            self.0.lock().unwrap().events.push(format!("start {} {}", label, total));
        }
        fn advance(&mut self) {
            self.0.lock().unwrap().events.push("advance".to_string());
        }
        fn finish(&mut self) {
            self.0.lock().unwrap().events.push("finish".to_string());
        }
    }

    #[rstest]
    #[case(ReportingMode::Documents, vec!["start data 2", "advance", "advance", "finish"])]
    #[case(
        ReportingMode::Records,
        vec!["start a 2", "advance", "advance", "finish", "start b 1", "advance", "finish"]
    )]
    #[case(ReportingMode::Off, vec![])]
    #[tokio::test]
    async fn test_reporting_granularity(#[case] mode: ReportingMode, #[case] expected: Vec<&str>) {
        let h = Harness::new(10);
        h.source.insert_table(definition("a", &["id", "name"]), rows(2));
        h.source.insert_table(definition("b", &["id", "name"]), rows(1));
        h.destination.insert_table(definition("a", &["id", "name"]), vec![]);
        h.destination.insert_table(definition("b", &["id", "name"]), vec![]);

        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let mut executor = h
            .executor()
            .with_reporter(Box::new(RecordingReporter(recorded.clone())), mode);
        executor
            .run(&Step::new("data", Mapping::identity()), &not_cancelled())
            .await
            .unwrap();

        assert_eq!(recorded.lock().unwrap().events, expected);
    }

    #[tokio::test]
    async fn test_plan_describes_without_writing() {
        let h = Harness::new(10);
        h.source.insert_table(definition("sales_flat_order", &["id", "status"]), rows(1));
        h.source.insert_table(definition("log_visitor", &["id"]), rows(1));
        h.source.insert_table(definition("customers", &["id"]), rows(1));
        h.source.insert_table(definition("done", &["id"]), rows(1));
        h.source.insert_table(definition("orphan", &["id"]), rows(1));
        h.destination.insert_table(definition("sales_order", &["id", "status"]), vec![]);
        h.destination.insert_table(definition("customers", &["id"]), vec![]);
        h.progress.add_processed_entity("data", "run", "done").await.unwrap();

        let step = Step::new("data", Mapping::from_yaml(SALES_MAP).unwrap());
        let plan = h.executor().plan(&step).await.unwrap();

        let actions: Vec<_> = plan.iter().map(|p| (p.source.as_str(), p.action)).collect();
        assert_eq!(
            actions,
            vec![
                ("sales_flat_order", PlannedAction::Transform),
                ("log_visitor", PlannedAction::Unresolved),
                ("customers", PlannedAction::Direct),
                ("done", PlannedAction::AlreadyProcessed),
                ("orphan", PlannedAction::MissingDestination),
            ]
        );
        assert_eq!(plan[0].destination.as_deref(), Some("sales_order"));
        assert!(h.destination.calls().is_empty());
        assert!(h.source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_plan_reports_reconcile() {
        let h = Harness::new(10);
        h.source.insert_table(definition("x", &["id"]), rows(1));
        h.source.insert_table(definition("y", &["id"]), rows(1));
        h.destination.insert_table(definition("y", &["id"]), vec![]);

        let step = Step::attributes("attrs", Mapping::identity(), vec!["x".into(), "y".into()]);
        let plan = h.executor().plan(&step).await.unwrap();
        assert_eq!(plan[0].action, PlannedAction::Reconcile);
        assert_eq!(plan[1].action, PlannedAction::Direct);
    }

    #[test]
    fn test_report_serializes() {
        let report = StepReport {
            step: "data".into(),
            records_written: 3,
            ..Default::default()
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["records_written"], 3);
    }
}
