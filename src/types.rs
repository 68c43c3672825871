use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

/// Formato canônico dos timestamps que atravessam o pipeline
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formato canônico de datas sem horário
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Representa uma linha de dados genérica
pub type DataRow = HashMap<String, DataValue>;

/// Sequência ordenada de linhas produzida pela extração
pub type Relation = Vec<DataRow>;

/// Valores de dados suportados
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    /// Data sem horário (YYYY-MM-DD)
    Date(NaiveDate),
    /// Data e horário sem timezone (YYYY-MM-DD HH:MM:SS)
    DateTime(NaiveDateTime),
    /// Timestamp com timezone UTC
    Timestamp(DateTime<Utc>),
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::String(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::String(value.to_string())
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Integer(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Boolean(value)
    }
}

impl From<NaiveDate> for DataValue {
    fn from(value: NaiveDate) -> Self {
        DataValue::Date(value)
    }
}

impl From<NaiveDateTime> for DataValue {
    fn from(value: NaiveDateTime) -> Self {
        DataValue::DateTime(value)
    }
}

impl From<DateTime<Utc>> for DataValue {
    fn from(value: DateTime<Utc>) -> Self {
        DataValue::Timestamp(value)
    }
}

impl<T: Into<DataValue>> From<Option<T>> for DataValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DataValue::Null)
    }
}

impl DataValue {
    /// Converte para string se possível
    pub fn as_string(&self) -> Option<String> {
        match self {
            DataValue::String(s) => Some(s.clone()),
            DataValue::Integer(i) => Some(i.to_string()),
            DataValue::Float(f) => Some(f.to_string()),
            DataValue::Boolean(b) => Some(b.to_string()),
            DataValue::Date(d) => Some(d.format(CANONICAL_DATE_FORMAT).to_string()),
            DataValue::DateTime(dt) => Some(dt.format(CANONICAL_DATETIME_FORMAT).to_string()),
            DataValue::Timestamp(ts) => Some(ts.format(CANONICAL_DATETIME_FORMAT).to_string()),
            DataValue::Null => None,
        }
    }

    /// Converte para inteiro se possível
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Integer(i) => Some(*i),
            DataValue::String(s) => s.trim().parse().ok(),
            DataValue::Float(f) => Some(*f as i64),
            DataValue::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Converte para float se possível
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float(f) => Some(*f),
            DataValue::Integer(i) => Some(*i as f64),
            DataValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Converte para boolean se possível
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            DataValue::Boolean(b) => Some(*b),
            DataValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" | "t" | "on" => Some(true),
                "false" | "0" | "no" | "n" | "f" | "off" | "" => Some(false),
                _ => None,
            },
            DataValue::Integer(i) => Some(*i != 0),
            DataValue::Float(f) => Some(*f != 0.0),
            _ => None,
        }
    }

    /// Converte para datetime (NaiveDateTime) se possível
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            DataValue::DateTime(dt) => Some(*dt),
            DataValue::Timestamp(ts) => Some(ts.naive_utc()),
            DataValue::Date(d) => d.and_hms_opt(0, 0, 0),
            DataValue::String(s) => {
                let s = s.trim();
                const FORMATS: [&str; 4] = [
                    "%Y-%m-%d %H:%M:%S",
                    "%Y-%m-%d %H:%M:%S%.f",
                    "%Y-%m-%dT%H:%M:%S",
                    "%Y-%m-%dT%H:%M:%S%.f",
                ];
                FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|ts| ts.naive_utc()))
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, CANONICAL_DATE_FORMAT)
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
            }
            _ => None,
        }
    }

    /// Verifica se é nulo
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Converte para o valor JSON aceito pelo formato newline-delimited
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataValue::String(s) => serde_json::Value::String(s.clone()),
            DataValue::Integer(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
            DataValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DataValue::Boolean(b) => serde_json::Value::Bool(*b),
            DataValue::Null => serde_json::Value::Null,
            other => other
                .as_string()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Verifica se a data está dentro do intervalo aceito pelo warehouse
pub fn is_plausible_year(dt: &NaiveDateTime) -> bool {
    dt.year() >= 1900
}

/// Modo de execução de uma rodada
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Todas as linhas, sobrescrevendo o destino
    Full,
    /// Somente as linhas de ontem, acrescentadas ao destino
    Incremental,
}

impl RunMode {
    pub fn from_daily_flag(daily: bool) -> Self {
        if daily {
            RunMode::Incremental
        } else {
            RunMode::Full
        }
    }

    /// Disposição de escrita correspondente ao modo
    pub fn write_mode(&self) -> WriteMode {
        match self {
            RunMode::Full => WriteMode::TruncateAndReplace,
            RunMode::Incremental => WriteMode::Append,
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Disposição de escrita de um job de carga
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    TruncateAndReplace,
}

impl WriteMode {
    /// Nome da disposição na API do warehouse
    pub fn as_disposition(&self) -> &'static str {
        match self {
            WriteMode::Append => "WRITE_APPEND",
            WriteMode::TruncateAndReplace => "WRITE_TRUNCATE",
        }
    }
}

/// Resultado da carga de uma tabela
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub table: String,
    pub rows_loaded: usize,
    pub total_rows_after: u64,
}

/// Desfecho do processamento de uma tabela numa rodada
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    Loaded {
        result: LoadResult,
        nulled_timestamps: usize,
    },
    /// Extração vazia, o loader não foi chamado
    Skipped { table: String },
    Failed {
        table: String,
        code: &'static str,
        message: String,
    },
}

impl TableOutcome {
    pub fn table(&self) -> &str {
        match self {
            TableOutcome::Loaded { result, .. } => &result.table,
            TableOutcome::Skipped { table } => table,
            TableOutcome::Failed { table, .. } => table,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TableOutcome::Failed { .. })
    }
}

/// Resumo de uma rodada completa
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: RunMode,
    pub tables: Vec<TableOutcome>,
    pub artifacts_deleted: usize,
    pub execution_time_ms: u64,
}

impl RunSummary {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            tables: Vec::new(),
            artifacts_deleted: 0,
            execution_time_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.tables.iter().any(TableOutcome::is_failed)
    }

    fn names_where(&self, pred: impl Fn(&TableOutcome) -> bool) -> Vec<&str> {
        self.tables.iter().filter(|t| pred(t)).map(TableOutcome::table).collect()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.names_where(|t| matches!(t, TableOutcome::Loaded { .. }))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_where(|t| matches!(t, TableOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_where(TableOutcome::is_failed)
    }
}

/// Estados da rodada para rastreamento de execução
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    DiscoverTables,
    ProcessTable(String),
    Cleanup,
    Done,
    Failed(String),
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Idle
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "Ocioso"),
            RunState::DiscoverTables => write!(f, "Descobrindo tabelas"),
            RunState::ProcessTable(table) => write!(f, "Processando {}", table),
            RunState::Cleanup => write!(f, "Limpeza"),
            RunState::Done => write!(f, "Concluído"),
            RunState::Failed(error) => write!(f, "Falhou: {}", error),
        }
    }
}

/// Eventos da rodada para monitoramento externo
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        run_id: String,
        mode: RunMode,
        timestamp: std::time::SystemTime,
    },
    StateChanged {
        run_id: String,
        old_state: RunState,
        new_state: RunState,
        timestamp: std::time::SystemTime,
    },
    TablesDiscovered {
        run_id: String,
        tables: Vec<String>,
    },
    /// Tabela sem linhas, ignorada com aviso
    TableSkipped {
        run_id: String,
        table: String,
    },
    TableLoaded {
        run_id: String,
        result: LoadResult,
        nulled_timestamps: usize,
    },
    TableFailed {
        run_id: String,
        table: String,
        error: String,
    },
    ArtifactDeleted {
        run_id: String,
        artifact: String,
    },
    Completed {
        run_id: String,
        summary: RunSummary,
        timestamp: std::time::SystemTime,
    },
}
