use thiserror::Error;

/// Tipo Result principal da biblioteca
pub type Result<T> = std::result::Result<T, ETLError>;

/// Erro principal do pipeline de inventário
#[derive(Error, Debug)]
pub enum ETLError {
    #[error("Erro de extração: {0}")]
    Extract(#[from] ExtractError),

    #[error("Erro de schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("Erro de carga: {0}")]
    Load(#[from] LoadError),

    #[error("Erro de staging: {0}")]
    Staging(#[from] StagingError),

    #[error("Erro de configuração: {0}")]
    Config(#[from] ConfigError),

    #[error("Erro de pipeline: {0}")]
    Pipeline(String),

    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro de serialização: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Erro genérico: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Erros da leitura no banco de origem
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Banco de origem indisponível: {0}")]
    SourceUnavailable(String),

    #[error("Consulta rejeitada para a tabela {table}: {message}")]
    Query { table: String, message: String },
}

/// Erros do registro de schemas
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Nenhum schema definido para a tabela: {0}")]
    NotFound(String),

    #[error("Tipo de campo desconhecido '{field_type}' no campo {field} da tabela {table}")]
    UnknownFieldType {
        table: String,
        field: String,
        field_type: String,
    },

    #[error("Schema inválido para a tabela {table}: {message}")]
    Invalid { table: String, message: String },
}

/// Erros relacionados ao carregamento no warehouse
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Colunas da tabela {table} não declaradas no schema de destino: {columns:?}")]
    SchemaMismatch { table: String, columns: Vec<String> },

    #[error("Job de carga falhou para {table}: {message}")]
    Job { table: String, message: String },

    #[error("Job de carga {job_id} para {table} não concluiu em {timeout_secs}s")]
    Timeout {
        table: String,
        job_id: String,
        timeout_secs: u64,
    },
}

/// Erros dos artefatos temporários de staging
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Falha de I/O no artefato {artifact}: {source}")]
    Io {
        artifact: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Artefato não encontrado: {0}")]
    NotFound(String),
}

/// Erros relacionados à configuração
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuração inválida: {0}")]
    InvalidConfig(String),

    #[error("Parâmetro obrigatório ausente: {0}")]
    MissingRequiredParameter(String),

    #[error("Valor inválido para {param}: {value}")]
    InvalidValue { param: String, value: String },

    #[error("Erro de parsing de configuração: {0}")]
    ParseError(String),
}

impl ETLError {
    /// Verifica se o erro tende a desaparecer na próxima execução agendada
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ETLError::Extract(ExtractError::SourceUnavailable(_))
                | ETLError::Load(LoadError::Timeout { .. })
        )
    }

    /// Retorna o código de erro
    pub fn error_code(&self) -> &'static str {
        match self {
            ETLError::Extract(ExtractError::SourceUnavailable(_)) => "SOURCE_UNAVAILABLE",
            ETLError::Extract(ExtractError::Query { .. }) => "QUERY_ERROR",
            ETLError::Schema(SchemaError::NotFound(_)) => "SCHEMA_NOT_FOUND",
            ETLError::Schema(_) => "SCHEMA_INVALID",
            ETLError::Load(LoadError::SchemaMismatch { .. }) => "SCHEMA_MISMATCH",
            ETLError::Load(LoadError::Job { .. }) => "LOAD_JOB_ERROR",
            ETLError::Load(LoadError::Timeout { .. }) => "LOAD_TIMEOUT",
            ETLError::Staging(_) => "STAGING_IO_ERROR",
            ETLError::Config(_) => "CONFIG_ERROR",
            ETLError::Pipeline(_) => "PIPELINE_ERROR",
            ETLError::Io(_) => "IO_ERROR",
            ETLError::Serialization(_) => "SERIALIZATION_ERROR",
            ETLError::Generic(_) => "GENERIC_ERROR",
        }
    }
}

impl From<config::ConfigError> for ETLError {
    fn from(err: config::ConfigError) -> Self {
        ETLError::Config(ConfigError::ParseError(err.to_string()))
    }
}

#[cfg(feature = "mysql")]
impl From<sqlx::Error> for ETLError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => {
                ETLError::Extract(ExtractError::SourceUnavailable(err.to_string()))
            }
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("28000") => {
                ETLError::Extract(ExtractError::SourceUnavailable(err.to_string()))
            }
            _ => ETLError::Generic(anyhow::anyhow!(err)),
        }
    }
}

#[cfg(feature = "bigquery")]
impl From<gcp_auth::Error> for ETLError {
    fn from(err: gcp_auth::Error) -> Self {
        ETLError::Config(ConfigError::InvalidConfig(format!(
            "credencial do warehouse: {}",
            err
        )))
    }
}

#[cfg(feature = "bigquery")]
impl From<reqwest::Error> for ETLError {
    fn from(err: reqwest::Error) -> Self {
        ETLError::Generic(anyhow::anyhow!(err))
    }
}
