/// Persistence/session layer
///
/// Executes compiled plans and returns flat result rows. `DataFusionSession`
/// runs them on a DataFusion `SessionContext` over CSV files, Delta tables or
/// in-memory Arrow batches.

mod arrow;

pub use self::arrow::{batch_rows, cell_value};

use crate::error::{RelqlError, Result};
use crate::query::{EntityRow, SelectPlan};
use async_graphql::Value;
use async_trait::async_trait;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::*;
use indexmap::IndexMap;
use std::sync::Arc;

/// One result row keyed by output column name
pub type ResultRow = IndexMap<String, Value>;

/// Runs compiled plans
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch(&self, plan: &SelectPlan) -> Result<Vec<ResultRow>>;

    /// Run a `COUNT` plan and return its single value
    async fn count(&self, plan: &SelectPlan) -> Result<u64>;

    /// Identifier-only reads of loaded to-one references, when supported
    fn identifiers(&self) -> Option<&dyn IdentifierLookup> {
        None
    }
}

/// Reads the identifier of a to-one reference from an already loaded row
/// without materializing the referenced row
pub trait IdentifierLookup: Send + Sync {
    /// `None` when the row holds no reference for the attribute,
    /// `Some(Value::Null)` for a reference known to be empty
    fn reference_identifier(&self, row: &EntityRow, attribute: &str) -> Option<Value>;
}

/// Request-scoped executor handed to resolvers as schema or request data
pub type SessionHandle = Arc<dyn QueryExecutor>;

/// DataFusion-backed session
#[derive(Clone)]
pub struct DataFusionSession {
    ctx: SessionContext,
}

impl DataFusionSession {
    pub fn new() -> Self {
        Self {
            ctx: SessionContext::new(),
        }
    }

    /// Open a session for one request, sharing the registered tables
    pub fn scope(&self) -> DataFusionSession {
        Self {
            ctx: SessionContext::new_with_state(self.ctx.state()),
        }
    }

    /// Register a table from a file path (CSV for local data, Delta otherwise)
    pub async fn register_table_from_path(&self, name: &str, path: &str) -> Result<()> {
        if path.ends_with(".csv") {
            self.ctx
                .register_csv(name, path, CsvReadOptions::default())
                .await
                .map_err(|e| {
                    RelqlError::Config(format!("Failed to register CSV '{}': {}", path, e))
                })?;
        } else {
            let delta_table = deltalake::open_table(path).await.map_err(|e| {
                RelqlError::Config(format!("Failed to open Delta table '{}': {}", path, e))
            })?;

            self.ctx
                .register_table(name, Arc::new(delta_table))
                .map_err(|e| {
                    RelqlError::Config(format!(
                        "Failed to register Delta table '{}': {}",
                        name, e
                    ))
                })?;
        }

        Ok(())
    }

    /// Register an in-memory table
    pub fn register_batch(&self, name: &str, batch: RecordBatch) -> Result<()> {
        self.ctx.register_batch(name, batch)?;
        Ok(())
    }

    async fn collect(&self, plan: &SelectPlan) -> Result<Vec<RecordBatch>> {
        let sql = plan.to_sql();
        tracing::debug!("Executing query: {}", sql);

        let df = self.ctx.sql(&sql).await?;
        Ok(df.collect().await?)
    }
}

impl Default for DataFusionSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryExecutor for DataFusionSession {
    async fn fetch(&self, plan: &SelectPlan) -> Result<Vec<ResultRow>> {
        let mut rows = Vec::new();
        for batch in self.collect(plan).await? {
            rows.extend(batch_rows(&batch)?);
        }
        Ok(rows)
    }

    async fn count(&self, plan: &SelectPlan) -> Result<u64> {
        let rows = self.fetch(plan).await?;
        let total = rows
            .first()
            .and_then(|row| row.values().next())
            .ok_or_else(|| RelqlError::Query("Count query returned no rows".to_string()))?;

        match total {
            Value::Number(number) => number
                .as_u64()
                .ok_or_else(|| RelqlError::Query(format!("Invalid count {}", number))),
            other => Err(RelqlError::Query(format!("Invalid count {}", other))),
        }
    }

    fn identifiers(&self) -> Option<&dyn IdentifierLookup> {
        Some(self)
    }
}

impl IdentifierLookup for DataFusionSession {
    fn reference_identifier(&self, row: &EntityRow, attribute: &str) -> Option<Value> {
        row.references.get(attribute).cloned()
    }
}
