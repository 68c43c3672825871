//! # Inventory ETL
//!
//! Pipeline que copia as tabelas de inventário de backups (`daily_log`, `backup_log`,
//! `servers_temp`, `database_list`) de um banco MySQL para o BigQuery, mais o
//! relatório diário de volume de backups.
//!
//! ## Modos de execução
//!
//! - **Completo** (padrão): todas as linhas, com `WRITE_TRUNCATE` no destino. Reexecutar
//!   converge para o mesmo estado.
//! - **Diário** (`--daily`): somente as linhas de ontem, com `WRITE_APPEND`.
//!
//! ## Exemplo
//!
//! ```rust,no_run
//! use inventory_etl::prelude::*;
//! use inventory_etl::extract::{memory::MemoryExtractor, RunWindow};
//! use inventory_etl::load::{InMemoryWarehouse, WarehouseLoader};
//! use std::sync::Arc;
//!
//! # async fn exemplo() -> Result<()> {
//! let registry = Arc::new(SchemaRegistry::load("tabelas.json")?);
//! let context = RunContext::builder(RunWindow::starting_now(RunMode::Incremental), registry)
//!     .allow_list(["daily_log"])
//!     .extractor(MemoryExtractor::new())
//!     .loader(WarehouseLoader::new(Arc::new(InMemoryWarehouse::new())))
//!     .build()?;
//!
//! let summary = Pipeline::new(context).execute().await?;
//! assert!(summary.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Arquitetura
//!
//! ### Extractors
//! Leem uma tabela da origem dentro da janela da rodada e normalizam datas.
//!
//! ### Transformers
//! Aplicam as regras declarativas de cada tabela: renomeação, remoção, booleanos e timestamps.
//!
//! ### Loaders
//! Serializam em NDJSON e submetem jobs de carga ao warehouse, com staging opcional.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;
pub mod schema;
pub mod extract;
pub mod transform;
pub mod load;
pub mod pipeline;
pub mod events;
pub mod report;
pub mod logging;

// Re-exports para facilitar o uso
pub use config::AppConfig;
pub use error::{ETLError, Result};
pub use types::{DataRow, DataValue, Relation, RunMode, RunSummary, RunState, RunEvent};
pub use traits::*;
pub use pipeline::{Pipeline, RunContext};
pub use events::{LoggingEventEmitter, InMemoryEventEmitter};

/// Prelude com imports mais comuns
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::error::{ETLError, Result};
    pub use crate::types::{
        DataRow, DataValue, LoadResult, Relation, RunEvent, RunMode, RunState, RunSummary,
        TableOutcome, WriteMode,
    };
    pub use crate::traits::{EventEmitter, Extractor, Loader, StagingStore, Transformer, Warehouse};
    pub use crate::schema::{FieldSpec, FieldType, SchemaRegistry, TableSpec, TransformRules};
    pub use crate::pipeline::{Pipeline, RunContext};
    pub use crate::events::{InMemoryEventEmitter, LoggingEventEmitter};
    pub use crate::transform::RuleTransformer;
}

/// Informações sobre a versão da biblioteca
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Informações sobre a biblioteca
pub fn about() -> &'static str {
    env!("CARGO_PKG_DESCRIPTION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_about() {
        assert!(!about().is_empty());
    }
}
