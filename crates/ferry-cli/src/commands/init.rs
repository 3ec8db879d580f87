//! Initialize a new Ferry project

use anyhow::Result;
use std::fs;
use std::path::Path;

const MAP: &str = r##"# Document and field mapping for the `data` step
source:
  documents:
    ignore: [log_*, customer_attr_*]
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
    handlers:
      sales_order.created_via:
        set_value:
          value: migration
      sales_order.label:
        template: "#{{ entity_id }} ({{ status }})"
"##;

const ATTR_GROUPS: &str = r#"# Attribute tables introduced by extensions
source_documents:
  - customer_attr_x
"#;

const SALES_FLAT_ORDER_SCHEMA: &str = r#"name: sales_flat_order
columns:
  - name: entity_id
    type: int
    nullable: false
  - name: status
    type: varchar
    size: 32
  - name: customer_email_addr
    type: varchar
    size: 255
  - name: legacy_flag
    type: smallint
"#;

const SALES_FLAT_ORDER_DATA: &str = r#"{"entity_id": 1, "status": "canceled", "customer_email_addr": "alice@example.com", "legacy_flag": 1}
{"entity_id": 2, "status": "complete", "customer_email_addr": "bob@example.com", "legacy_flag": 0}
{"entity_id": 3, "status": "pending", "customer_email_addr": "carol@example.com", "legacy_flag": 0}
"#;

const LOG_VISITOR_SCHEMA: &str = r#"name: log_visitor
columns:
  - name: visitor_id
    type: int
"#;

const CUSTOMER_ATTR_SCHEMA: &str = r#"name: customer_attr_x
columns:
  - name: value_id
    type: int
    nullable: false
  - name: entity_id
    type: int
  - name: value
    type: varchar
    size: 255
"#;

const CUSTOMER_ATTR_DATA: &str = r#"{"value_id": 1, "entity_id": 1, "value": "gold"}
{"value_id": 2, "entity_id": 2, "value": "silver"}
"#;

const SALES_ORDER_SCHEMA: &str = r#"name: sales_order
columns:
  - name: entity_id
    type: int
    nullable: false
  - name: status
    type: varchar
    size: 32
  - name: customer_email
    type: varchar
    size: 255
  - name: created_via
    type: varchar
    size: 32
  - name: label
    type: varchar
    size: 64
"#;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    // Get absolute path for deriving name
    let abs_path = project_dir.canonicalize()?;

    // Derive project name from directory name if not provided
    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    // Check if already initialized
    if project_dir.join("ferry.yaml").exists() {
        anyhow::bail!(
            "Directory '{}' already contains a ferry.yaml",
            project_dir.display()
        );
    }

    tracing::info!("Creating new Ferry project: {}", project_name);

    // Create directory structure
    fs::create_dir_all(project_dir.join("maps"))?;
    fs::create_dir_all(project_dir.join("source"))?;
    fs::create_dir_all(project_dir.join("destination"))?;

    // Create ferry.yaml
    let config = format!(
        r#"# Ferry Project Configuration
name: {project_name}
version: "0.1.0"

source:
  type: file
  path: ./source
  page_size: 500

destination:
  type: file
  path: ./destination
  page_size: 500

# Completed documents, so an interrupted run resumes where it stopped
progress:
  type: file
  path: .ferry/progress.json

# documents | records | off
reporting: documents

steps:
  - name: data
    kind: map
    map_file: maps/map.yaml

  - name: customer_attributes
    kind: attributes
    groups_file: maps/customer_attr_groups.yaml
    group: source_documents
"#
    );
    fs::write(project_dir.join("ferry.yaml"), config)?;

    fs::write(project_dir.join("maps/map.yaml"), MAP)?;
    fs::write(
        project_dir.join("maps/customer_attr_groups.yaml"),
        ATTR_GROUPS,
    )?;

    // Sample source store
    let source = project_dir.join("source");
    fs::write(source.join("sales_flat_order.schema.yaml"), SALES_FLAT_ORDER_SCHEMA)?;
    fs::write(source.join("sales_flat_order.jsonl"), SALES_FLAT_ORDER_DATA)?;
    fs::write(source.join("log_visitor.schema.yaml"), LOG_VISITOR_SCHEMA)?;
    fs::write(source.join("log_visitor.jsonl"), "{\"visitor_id\": 1}\n")?;
    fs::write(source.join("customer_attr_x.schema.yaml"), CUSTOMER_ATTR_SCHEMA)?;
    fs::write(source.join("customer_attr_x.jsonl"), CUSTOMER_ATTR_DATA)?;

    // Destination store starts with the target schema only
    let destination = project_dir.join("destination");
    fs::write(destination.join("sales_order.schema.yaml"), SALES_ORDER_SCHEMA)?;
    fs::write(destination.join("sales_order.jsonl"), "")?;

    // Create .gitignore
    let gitignore = r#"# Ferry progress state
.ferry/

# Migrated data
destination/*.jsonl

# IDE
.idea/
.vscode/
*.swp
"#;
    fs::write(project_dir.join(".gitignore"), gitignore)?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  ferry validate    # Check configuration");
    tracing::info!("  ferry plan        # Preview per-document decisions");
    tracing::info!("  ferry run         # Migrate");

    Ok(())
}
