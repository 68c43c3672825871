//! # Schema Registry
//!
//! Registro imutável `tabela lógica → TableSpec`, carregado uma única vez no início
//! da rodada a partir de um arquivo declarativo (JSON ou INI).
//!
//! Cada entrada descreve os campos de destino no warehouse e, opcionalmente, as
//! regras de transformação da tabela (renomeações, colunas descartadas, colunas
//! booleanas e de timestamp) e a coluna de data usada no modo incremental.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use crate::error::{ConfigError, ETLError, Result, SchemaError};

/// Tipos escalares nativos do warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    String,
    Timestamp,
    Boolean,
    Float,
}

impl FieldType {
    /// Converte a string declarada no arquivo; tipos fora do enum são erro de validação
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "INTEGER" => Some(FieldType::Integer),
            "STRING" => Some(FieldType::String),
            "TIMESTAMP" => Some(FieldType::Timestamp),
            "BOOLEAN" => Some(FieldType::Boolean),
            "FLOAT" => Some(FieldType::Float),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::String => "STRING",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Float => "FLOAT",
        }
    }
}

/// Campo de destino (nome, tipo)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Regras declarativas de transformação de uma tabela
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformRules {
    /// Pares (coluna de origem, coluna de destino), aplicados em ordem
    pub rename: Vec<(String, String)>,
    /// Colunas removidas após a renomeação
    pub drop: Vec<String>,
    /// Nomes já renomeados
    pub boolean_columns: Vec<String>,
    pub timestamp_columns: Vec<String>,
}

/// Colunas booleanas do inventário de servidores
pub const SERVER_BOOLEAN_COLUMNS: [&str; 13] = [
    "sun", "mon", "tue", "wed", "thu", "fri", "sat", "encrypted", "ssl", "backup", "load",
    "size", "active",
];

impl TransformRules {
    /// Regras históricas de cada tabela do inventário, usadas quando o arquivo não declara nenhuma
    pub fn builtin(table: &str) -> Self {
        let owned = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect::<Vec<_>>()
        };

        match table {
            "daily_log" => Self {
                rename: owned(&[
                    ("backup_date", "BackupDate"),
                    ("server", "Server"),
                    ("database", "Database"),
                    ("size", "Size"),
                    ("state", "State"),
                    ("last_update", "LastUpdate"),
                ]),
                drop: vec!["fileName".to_string()],
                ..Self::default()
            },
            "database_list" | "servers_temp" => Self {
                boolean_columns: SERVER_BOOLEAN_COLUMNS.iter().map(|c| c.to_string()).collect(),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rename.is_empty()
            && self.drop.is_empty()
            && self.boolean_columns.is_empty()
            && self.timestamp_columns.is_empty()
    }
}

/// Descrição completa de uma tabela do pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub logical_name: String,
    /// Consulta base; `{table}` é substituído pelo nome lógico
    pub source_query_template: String,
    pub destination_fields: Vec<FieldSpec>,
    pub partition_field: Option<String>,
    /// Coluna de origem filtrada por "ontem" no modo incremental
    pub date_column: Option<String>,
    pub rules: TransformRules,
}

pub const DEFAULT_QUERY_TEMPLATE: &str = "SELECT * FROM {table}";

impl TableSpec {
    /// Cria uma especificação validada
    pub fn new(
        logical_name: impl Into<String>,
        destination_fields: Vec<FieldSpec>,
        partition_field: Option<String>,
    ) -> Result<Self> {
        let logical_name = logical_name.into();
        let spec = Self {
            rules: TransformRules::builtin(&logical_name),
            date_column: builtin_date_column(&logical_name),
            source_query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
            logical_name,
            destination_fields,
            partition_field,
        };
        spec.validate()?;
        Ok(spec.with_default_timestamp_columns())
    }

    pub fn with_query_template(mut self, template: impl Into<String>) -> Self {
        self.source_query_template = template.into();
        self
    }

    pub fn with_date_column(mut self, column: Option<String>) -> Self {
        self.date_column = column;
        self
    }

    pub fn with_rules(mut self, rules: TransformRules) -> Self {
        self.rules = rules;
        self.with_default_timestamp_columns()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.destination_fields.iter().find(|f| f.name == name)
    }

    /// Consulta base com o nome da tabela aplicado
    pub fn base_query(&self) -> String {
        self.source_query_template.replace("{table}", &self.logical_name)
    }

    /// Valida as invariantes da especificação
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| {
            ETLError::Schema(SchemaError::Invalid {
                table: self.logical_name.clone(),
                message,
            })
        };

        if self.destination_fields.is_empty() {
            return Err(invalid("destination_fields está vazio".to_string()));
        }

        if let Some(partition) = &self.partition_field {
            match self.field(partition) {
                Some(f) if f.field_type == FieldType::Timestamp => {}
                Some(f) => {
                    return Err(invalid(format!(
                        "campo de partição {} é {} e não TIMESTAMP",
                        partition,
                        f.field_type.as_str()
                    )))
                }
                None => {
                    return Err(invalid(format!(
                        "campo de partição {} não está declarado",
                        partition
                    )))
                }
            }
        }

        Ok(())
    }

    /// Sem colunas de timestamp explícitas, usa os campos TIMESTAMP do destino
    fn with_default_timestamp_columns(mut self) -> Self {
        if self.rules.timestamp_columns.is_empty() {
            self.rules.timestamp_columns = self
                .destination_fields
                .iter()
                .filter(|f| f.field_type == FieldType::Timestamp)
                .map(|f| f.name.clone())
                .collect();
        }
        self
    }
}

fn builtin_date_column(table: &str) -> Option<String> {
    match table {
        "daily_log" | "backup_log" => Some("backup_date".to_string()),
        _ => None,
    }
}

fn builtin_partition_field(table: &str, fields: &[FieldSpec]) -> Option<String> {
    match table {
        "daily_log" if fields.iter().any(|f| f.name == "BackupDate") => {
            Some("BackupDate".to_string())
        }
        _ => None,
    }
}

/// Registro de schemas carregado no início da rodada
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSpec>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTable {
    Fields(Vec<RawField>),
    Detailed(RawDetailedTable),
}

#[derive(Debug, Default, Deserialize)]
struct RawDetailedTable {
    fields: Vec<RawField>,
    #[serde(default)]
    partition_field: Option<String>,
    #[serde(default)]
    date_column: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    rename: Option<Vec<(String, String)>>,
    #[serde(default)]
    drop: Option<Vec<String>>,
    #[serde(default)]
    boolean_columns: Option<Vec<String>>,
    #[serde(default)]
    timestamp_columns: Option<Vec<String>>,
}

/// Seção INI: listas separadas por vírgula, pares no formato `a:b`
#[derive(Debug, Deserialize)]
struct IniTable {
    fields: String,
    #[serde(default)]
    partition_field: Option<String>,
    #[serde(default)]
    date_column: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    rename: Option<String>,
    #[serde(default)]
    drop: Option<String>,
    #[serde(default)]
    boolean_columns: Option<String>,
    #[serde(default)]
    timestamp_columns: Option<String>,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_pairs(table: &str, key: &str, raw: &str) -> Result<Vec<(String, String)>> {
    split_list(raw)
        .into_iter()
        .map(|item| {
            item.split_once(':')
                .map(|(a, b)| (a.trim().to_string(), b.trim().to_string()))
                .ok_or_else(|| {
                    ETLError::Schema(SchemaError::Invalid {
                        table: table.to_string(),
                        message: format!("entrada '{}' de {} não está no formato a:b", item, key),
                    })
                })
        })
        .collect()
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra (ou substitui) uma especificação
    pub fn insert(&mut self, spec: TableSpec) {
        self.tables.insert(spec.logical_name.clone(), spec);
    }

    pub fn with_table(mut self, spec: TableSpec) -> Self {
        self.insert(spec);
        self
    }

    /// Obtém a especificação de uma tabela
    pub fn get_schema(&self, table_name: &str) -> Result<&TableSpec> {
        self.tables
            .get(table_name)
            .ok_or_else(|| ETLError::Schema(SchemaError::NotFound(table_name.to_string())))
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.tables.contains_key(table_name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Carrega o registro de um arquivo, escolhendo o formato pela extensão
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ETLError::Config(ConfigError::InvalidConfig(format!(
                "não foi possível ler o registro de schemas {}: {}",
                path.display(),
                e
            )))
        })?;

        let registry = match path.extension().and_then(|e| e.to_str()) {
            Some("ini") | Some("conf") | Some("cfg") => Self::from_ini_str(&content)?,
            _ => Self::from_json_str(&content)?,
        };

        tracing::info!(
            path = %path.display(),
            tables = ?registry.table_names(),
            "Registro de schemas carregado"
        );
        Ok(registry)
    }

    /// Carrega o registro de um documento JSON
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: HashMap<String, RawTable> = serde_json::from_str(content)?;
        let mut registry = Self::new();

        for (table, entry) in raw {
            let detailed = match entry {
                RawTable::Fields(fields) => RawDetailedTable {
                    fields,
                    ..RawDetailedTable::default()
                },
                RawTable::Detailed(detailed) => detailed,
            };
            registry.insert(build_spec(&table, detailed)?);
        }

        Ok(registry)
    }

    /// Carrega o registro de um documento INI (uma seção por tabela)
    pub fn from_ini_str(content: &str) -> Result<Self> {
        let raw: HashMap<String, IniTable> = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Ini))
            .build()?
            .try_deserialize()?;
        let mut registry = Self::new();

        for (table, ini) in raw {
            let fields = split_pairs(&table, "fields", &ini.fields)?
                .into_iter()
                .map(|(name, field_type)| RawField { name, field_type })
                .collect();

            let detailed = RawDetailedTable {
                fields,
                partition_field: ini.partition_field,
                date_column: ini.date_column,
                query: ini.query,
                rename: ini
                    .rename
                    .as_deref()
                    .map(|r| split_pairs(&table, "rename", r))
                    .transpose()?,
                drop: ini.drop.as_deref().map(split_list),
                boolean_columns: ini.boolean_columns.as_deref().map(split_list),
                timestamp_columns: ini.timestamp_columns.as_deref().map(split_list),
            };
            registry.insert(build_spec(&table, detailed)?);
        }

        Ok(registry)
    }
}

fn build_spec(table: &str, raw: RawDetailedTable) -> Result<TableSpec> {
    let fields = raw
        .fields
        .into_iter()
        .map(|f| {
            FieldType::parse(&f.field_type)
                .map(|t| FieldSpec::new(f.name.clone(), t))
                .ok_or_else(|| {
                    ETLError::Schema(SchemaError::UnknownFieldType {
                        table: table.to_string(),
                        field: f.name,
                        field_type: f.field_type,
                    })
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let partition_field = raw
        .partition_field
        .or_else(|| builtin_partition_field(table, &fields));

    let mut spec = TableSpec::new(table, fields, partition_field)?;

    if let Some(query) = raw.query {
        spec = spec.with_query_template(query);
    }
    if raw.date_column.is_some() {
        spec = spec.with_date_column(raw.date_column);
    }

    let declared = TransformRules {
        rename: raw.rename.unwrap_or_default(),
        drop: raw.drop.unwrap_or_default(),
        boolean_columns: raw.boolean_columns.unwrap_or_default(),
        timestamp_columns: raw.timestamp_columns.unwrap_or_default(),
    };
    if !declared.is_empty() {
        spec = spec.with_rules(declared);
    }

    Ok(spec)
}
