//! Store trait and implementations
//!
//! A store holds documents: their table definitions and their records. The
//! engine reads from a source store and writes to a destination store
//! through the same [`Store`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use crate::document::{Document, Record, TableDefinition};
use crate::error::{Error, Result};

/// Trait for source and destination stores
#[async_trait]
pub trait Store: Send + Sync {
    /// Store name used in logs and errors
    fn name(&self) -> &str;

    /// Number of records returned per page
    fn page_size(&self) -> usize;

    /// Document names in store order
    async fn list_documents(&self) -> Result<Vec<String>>;

    /// Load a document's structure
    async fn document(&self, name: &str) -> Result<Document>;

    /// Fetch one page of records. An empty page marks the end.
    async fn records_page(&self, document: &str, page: usize) -> Result<Vec<Record>>;

    /// Number of records in a document
    async fn record_count(&self, document: &str) -> Result<u64>;

    /// Remove every record of a document
    async fn clear_document(&self, document: &str) -> Result<()>;

    /// Write a batch of records. Either the whole batch is stored or the call fails.
    async fn save_records(&self, document: &str, records: Vec<Record>) -> Result<()>;

    /// Current table definition, `None` if the table does not exist
    async fn table_definition(&self, name: &str) -> Result<Option<TableDefinition>>;

    /// Create the table, or alter it to match `definition`
    async fn create_or_alter_table(&self, definition: &TableDefinition) -> Result<()>;
}

/// Store configuration from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Directory of JSONL documents
    File(FileStoreConfig),

    /// Empty in-process store, discarded at exit
    Memory {
        /// Records per page
        #[serde(default = "default_page_size")]
        page_size: usize,
    },
}

impl StoreConfig {
    /// Records per page
    pub fn page_size(&self) -> usize {
        match self {
            Self::File(f) => f.page_size,
            Self::Memory { page_size } => *page_size,
        }
    }

    /// Open the configured store. Relative paths resolve against `base_path`.
    pub fn open(&self, name: &str, base_path: &Path) -> Result<Arc<dyn Store>> {
        match self {
            Self::File(f) => Ok(Arc::new(FileStore::new(name, f.resolve(base_path)))),
            Self::Memory { page_size } => Ok(Arc::new(MemoryStore::new(name, *page_size))),
        }
    }
}

/// File store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Directory holding `<name>.schema.yaml` and `<name>.jsonl` files
    pub path: String,

    /// Records per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Prefix prepended to document names on disk
    #[serde(default)]
    pub prefix: String,
}

fn default_page_size() -> usize {
    500
}

impl FileStoreConfig {
    fn resolve(&self, base_path: &Path) -> Self {
        let path = Path::new(&self.path);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_path.join(path)
        };
        Self {
            path: path.display().to_string(),
            ..self.clone()
        }
    }
}

// ============================================================================
// File Store
// ============================================================================

const SCHEMA_SUFFIX: &str = ".schema.yaml";
const DATA_SUFFIX: &str = ".jsonl";

/// Store backed by a directory of JSONL files
pub struct FileStore {
    name: String,
    config: FileStoreConfig,
}

impl FileStore {
    /// Create a file store
    pub fn new(name: impl Into<String>, config: FileStoreConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    fn physical(&self, document: &str) -> String {
        format!("{}{}", self.config.prefix, document)
    }

    fn schema_path(&self, document: &str) -> PathBuf {
        Path::new(&self.config.path).join(format!("{}{}", self.physical(document), SCHEMA_SUFFIX))
    }

    fn data_path(&self, document: &str) -> PathBuf {
        Path::new(&self.config.path).join(format!("{}{}", self.physical(document), DATA_SUFFIX))
    }

    fn io_error(&self, path: &Path, err: std::io::Error) -> Error {
        Error::store(&self.name, format!("{}: {}", path.display(), err))
    }

    fn ensure_exists(&self, document: &str) -> Result<()> {
        if self.schema_path(document).exists() {
            Ok(())
        } else {
            Err(Error::DocumentNotFound {
                store: self.name.clone(),
                document: document.to_string(),
            })
        }
    }

    fn read_lines(&self, document: &str) -> Result<impl Iterator<Item = Result<String>> + '_> {
        self.ensure_exists(document)?;
        let path = self.data_path(document);
        let file = match std::fs::File::open(&path) {
            Ok(file) => Some(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(self.io_error(&path, e)),
        };
        Ok(file
            .into_iter()
            .flat_map(|f| BufReader::new(f).lines())
            .map(move |line| line.map_err(|e| self.io_error(&path, e)))
            .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty())))
    }

    /// Replace `path` with `contents` via a synced temp file and rename
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let mut file = std::fs::File::create(&tmp).map_err(|e| self.io_error(&tmp, e))?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .map_err(|e| self.io_error(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| self.io_error(path, e))
    }
}

#[async_trait]
impl Store for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_size(&self) -> usize {
        self.config.page_size
    }

    async fn list_documents(&self) -> Result<Vec<String>> {
        let dir = Path::new(&self.config.path);
        let entries = std::fs::read_dir(dir).map_err(|e| self.io_error(dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error(dir, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name
                .strip_suffix(SCHEMA_SUFFIX)
                .and_then(|f| f.strip_prefix(self.config.prefix.as_str()))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn document(&self, name: &str) -> Result<Document> {
        match self.table_definition(name).await? {
            Some(def) => Ok(Document::new(name, def.columns)),
            None => Err(Error::DocumentNotFound {
                store: self.name.clone(),
                document: name.to_string(),
            }),
        }
    }

    async fn records_page(&self, document: &str, page: usize) -> Result<Vec<Record>> {
        let size = self.config.page_size;
        self.read_lines(document)?
            .skip(page * size)
            .take(size)
            .map(|line| {
                let value: Value = serde_json::from_str(&line?)?;
                Record::from_value(document, value).ok_or_else(|| {
                    Error::store(&self.name, format!("non-object record in '{}'", document))
                })
            })
            .collect()
    }

    async fn record_count(&self, document: &str) -> Result<u64> {
        let mut count = 0;
        for line in self.read_lines(document)? {
            line?;
            count += 1;
        }
        Ok(count)
    }

    async fn clear_document(&self, document: &str) -> Result<()> {
        self.ensure_exists(document)?;
        self.write_atomic(&self.data_path(document), b"")
    }

    async fn save_records(&self, document: &str, records: Vec<Record>) -> Result<()> {
        self.ensure_exists(document)?;
        let path = self.data_path(document);
        let mut page = Vec::new();
        for record in records {
            serde_json::to_writer(&mut page, &Value::Object(record.into_data()))?;
            page.push(b'\n');
        }
        if page.is_empty() {
            return Ok(());
        }

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| self.io_error(&path, e))?;
        let previous_len = file
            .metadata()
            .map_err(|e| self.io_error(&path, e))?
            .len();
        if previous_len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))
                .and_then(|_| file.read_exact(&mut last))
                .map_err(|e| self.io_error(&path, e))?;
            if last[0] != b'\n' {
                page.insert(0, b'\n');
            }
        }

        // A page lands whole or not at all
        if let Err(err) = file.write_all(&page).and_then(|_| file.sync_all()) {
            if let Err(truncate) = file.set_len(previous_len) {
                warn!(path = %path.display(), error = %truncate, "Could not roll back partial page");
            }
            return Err(self.io_error(&path, err));
        }
        Ok(())
    }

    async fn table_definition(&self, name: &str) -> Result<Option<TableDefinition>> {
        let path = self.schema_path(name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&path, e)),
        };
        let mut def: TableDefinition = serde_yaml::from_str(&contents)?;
        def.name = name.to_string();
        Ok(Some(def))
    }

    async fn create_or_alter_table(&self, definition: &TableDefinition) -> Result<()> {
        let dir = Path::new(&self.config.path);
        std::fs::create_dir_all(dir).map_err(|e| self.io_error(dir, e))?;
        let yaml = serde_yaml::to_string(definition)?;
        self.write_atomic(&self.schema_path(&definition.name), yaml.as_bytes())?;

        let data = self.data_path(&definition.name);
        if !data.exists() {
            self.write_atomic(&data, b"")?;
        }
        Ok(())
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// A call observed by a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `records_page(document, page)`
    RecordsPage(String, usize),
    /// `clear_document(document)`
    Clear(String),
    /// `save_records(document, batch size)`
    Save(String, usize),
    /// `create_or_alter_table(name)`
    CreateOrAlter(String),
}

impl StoreCall {
    /// Document the call touched
    pub fn document(&self) -> &str {
        match self {
            Self::RecordsPage(d, _) | Self::Clear(d) | Self::Save(d, _) | Self::CreateOrAlter(d) => d,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    order: Vec<String>,
    tables: HashMap<String, MemoryTable>,
    calls: Vec<StoreCall>,
    failing_saves: HashSet<String>,
    failing_ddl: HashSet<String>,
}

#[derive(Debug)]
struct MemoryTable {
    definition: TableDefinition,
    rows: Vec<Map<String, Value>>,
}

/// In-process store, mainly for tests and dry runs
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    page_size: usize,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty memory store
    pub fn new(name: impl Into<String>, page_size: usize) -> Self {
        Self {
            name: name.into(),
            page_size,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add (or replace) a table with its rows
    pub fn insert_table(&self, definition: TableDefinition, rows: Vec<Value>) {
        let mut state = self.lock();
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        if !state.tables.contains_key(&definition.name) {
            state.order.push(definition.name.clone());
        }
        state
            .tables
            .insert(definition.name.clone(), MemoryTable { definition, rows });
    }

    /// All records currently stored for a document
    pub fn records(&self, document: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(document)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|r| Record::with_data(document, r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Calls observed so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Make every `save_records` call for `document` fail
    pub fn fail_saves(&self, document: &str) {
        self.lock().failing_saves.insert(document.to_string());
    }

    /// Make every `create_or_alter_table` call for `document` fail
    pub fn fail_ddl(&self, document: &str) {
        self.lock().failing_ddl.insert(document.to_string());
    }

    fn not_found(&self, document: &str) -> Error {
        Error::DocumentNotFound {
            store: self.name.clone(),
            document: document.to_string(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn list_documents(&self) -> Result<Vec<String>> {
        Ok(self.lock().order.clone())
    }

    async fn document(&self, name: &str) -> Result<Document> {
        self.lock()
            .tables
            .get(name)
            .map(|t| Document::from(t.definition.clone()))
            .ok_or_else(|| self.not_found(name))
    }

    async fn records_page(&self, document: &str, page: usize) -> Result<Vec<Record>> {
        let mut state = self.lock();
        state
            .calls
            .push(StoreCall::RecordsPage(document.to_string(), page));
        let table = state
            .tables
            .get(document)
            .ok_or_else(|| self.not_found(document))?;
        Ok(table
            .rows
            .iter()
            .skip(page * self.page_size)
            .take(self.page_size)
            .map(|r| Record::with_data(document, r.clone()))
            .collect())
    }

    async fn record_count(&self, document: &str) -> Result<u64> {
        self.lock()
            .tables
            .get(document)
            .map(|t| t.rows.len() as u64)
            .ok_or_else(|| self.not_found(document))
    }

    async fn clear_document(&self, document: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Clear(document.to_string()));
        let table = state
            .tables
            .get_mut(document)
            .ok_or_else(|| self.not_found(document))?;
        table.rows.clear();
        Ok(())
    }

    async fn save_records(&self, document: &str, records: Vec<Record>) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(StoreCall::Save(document.to_string(), records.len()));
        if state.failing_saves.contains(document) {
            return Err(Error::store(&self.name, format!("write to '{}' rejected", document)));
        }
        let table = state
            .tables
            .get_mut(document)
            .ok_or_else(|| self.not_found(document))?;
        table
            .rows
            .extend(records.into_iter().map(Record::into_data));
        Ok(())
    }

    async fn table_definition(&self, name: &str) -> Result<Option<TableDefinition>> {
        Ok(self.lock().tables.get(name).map(|t| t.definition.clone()))
    }

    async fn create_or_alter_table(&self, definition: &TableDefinition) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(StoreCall::CreateOrAlter(definition.name.clone()));
        if state.failing_ddl.contains(&definition.name) {
            return Err(Error::store(
                &self.name,
                format!("DDL for '{}' rejected", definition.name),
            ));
        }
        let state = &mut *state;
        if !state.tables.contains_key(&definition.name) {
            state.order.push(definition.name.clone());
        }
        state
            .tables
            .entry(definition.name.clone())
            .and_modify(|t| t.definition = definition.clone())
            .or_insert_with(|| MemoryTable {
                definition: definition.clone(),
                rows: Vec::new(),
            });
        Ok(())
    }
}
