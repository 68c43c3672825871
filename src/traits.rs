use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use crate::error::Result;
use crate::extract::RunWindow;
use crate::schema::{FieldSpec, TableSpec};
use crate::types::{LoadResult, Relation, WriteMode};

/// Trait para componentes que extraem dados do banco de origem
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Catálogo de tabelas base da origem
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Extrai as linhas da tabela dentro da janela da rodada
    async fn extract(&self, table: &TableSpec, window: &RunWindow) -> Result<Relation>;
}

/// Contagem de valores descartados durante a transformação
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// (coluna, quantidade) de timestamps inválidos convertidos em nulo
    pub nulled_timestamps: Vec<(String, usize)>,
}

impl TransformReport {
    pub fn total_nulled(&self) -> usize {
        self.nulled_timestamps.iter().map(|(_, n)| n).sum()
    }
}

/// Trait para componentes que transformam dados
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Transforma a relação e informa o que foi anulado
    async fn transform_with_report(
        &self,
        data: Relation,
        table_name: &str,
    ) -> Result<(Relation, TransformReport)>;

    /// Transforma a relação segundo as regras da tabela
    async fn transform(&self, data: Relation, table_name: &str) -> Result<Relation> {
        Ok(self.transform_with_report(data, table_name).await?.0)
    }
}

/// Trait para componentes que carregam dados no warehouse
#[async_trait]
pub trait Loader: Send + Sync {
    /// Carrega a relação no destino descrito pela especificação
    async fn load(&self, data: Relation, table: &TableSpec, write_mode: WriteMode)
        -> Result<LoadResult>;
}

/// Pedido de job de carga no warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJobRequest {
    pub table: String,
    pub fields: Vec<FieldSpec>,
    pub write_mode: WriteMode,
    /// Particionamento diário declarado em toda carga
    pub partition_field: Option<String>,
}

impl LoadJobRequest {
    pub fn for_table(table: &TableSpec, write_mode: WriteMode) -> Self {
        Self {
            table: table.logical_name.clone(),
            fields: table.destination_fields.clone(),
            write_mode,
            partition_field: table.partition_field.clone(),
        }
    }
}

/// Referência a um job assíncrono submetido
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub location: Option<String>,
}

/// Resultado final de um job de carga
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed { errors: Vec<String> },
}

/// Colaborador remoto: warehouse colunar com jobs de carga
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Submete registros NDJSON para carga
    async fn submit_load_job(&self, records: Vec<u8>, request: &LoadJobRequest)
        -> Result<JobHandle>;

    /// Bloqueia até o job terminar
    async fn await_job(&self, job: &JobHandle) -> Result<JobOutcome>;

    /// Total de linhas da tabela de destino
    async fn row_count(&self, table: &str) -> Result<u64>;
}

/// Referência a um artefato de staging
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle {
    pub id: String,
}

impl std::fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Área de staging dos registros serializados
#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn write(&self, table: &str, records: &[u8]) -> Result<ArtifactHandle>;

    async fn read(&self, artifact: &ArtifactHandle) -> Result<Vec<u8>>;

    /// Artefatos com modificação anterior a `now - age`
    async fn list_older_than(&self, age: Duration, now: SystemTime) -> Result<Vec<ArtifactHandle>>;

    async fn delete(&self, artifact: &ArtifactHandle) -> Result<()>;
}

/// Trait para emissão de eventos da rodada
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Emite um evento da rodada
    async fn emit(&self, event: crate::types::RunEvent) -> Result<()>;
}
