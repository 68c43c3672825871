use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{ConfigError, ETLError, Result};

/// Configuração principal da rodada
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub warehouse: WarehouseConfig,
    pub schema: SchemaConfig,
    pub staging: StagingConfig,
    pub logging: LoggingConfig,
    /// Allow-list: únicas tabelas que o pipeline pode tocar
    pub tables: Vec<String>,
}

/// Banco relacional de origem
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub credentials_path: PathBuf,
    pub connect_timeout_seconds: u64,
}

/// Warehouse de destino
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub key_file: PathBuf,
    pub location: Option<String>,
    /// Prazo máximo de espera por um job de carga; `0` espera indefinidamente
    pub load_timeout_seconds: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub path: PathBuf,
}

/// Estratégia de staging dos registros antes do job de carga
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingStrategy {
    /// Registros enviados direto da memória
    Direct,
    /// Artefato NDJSON no diretório de staging
    File,
    /// Buffer em memória
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StagingConfig {
    pub dir: PathBuf,
    pub strategy: StagingStrategy,
    pub retention_days: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            warehouse: WarehouseConfig::default(),
            schema: SchemaConfig::default(),
            staging: StagingConfig::default(),
            logging: LoggingConfig::default(),
            tables: ["backup_log", "daily_log", "servers_temp", "database_list"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            database: "ti_db_inventory".to_string(),
            credentials_path: PathBuf::from("/backup/configs/db_credentials.conf"),
            connect_timeout_seconds: 30,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset_id: "ti_db_inventory".to_string(),
            key_file: PathBuf::from("/root/jsonfiles/ti-dba-prod-01.json"),
            location: None,
            load_timeout_seconds: 1800,
            poll_interval_ms: 2000,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/backup/configs/MYSQL_to_BigQuery_tables.json"),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/backup/dumps"),
            strategy: StagingStrategy::File,
            retention_days: 7,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/backup/logs"),
            file_prefix: "MYSQL_to_BQ".to_string(),
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Cria um novo builder para configuração
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Carrega a configuração: arquivo opcional sobreposto por variáveis `ETL_*`
    ///
    /// Variáveis aninhadas usam `__` como separador, por exemplo
    /// `ETL_WAREHOUSE__PROJECT_ID=meu-projeto`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("ETL")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("tables")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Carrega configuração de string TOML
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml_str, config::FileFormat::Toml))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Valida a configuração
    pub fn validate(&self) -> Result<()> {
        if self.warehouse.project_id.trim().is_empty() {
            return Err(ETLError::Config(ConfigError::MissingRequiredParameter(
                "warehouse.project_id".to_string(),
            )));
        }

        if self.warehouse.dataset_id.trim().is_empty() {
            return Err(ETLError::Config(ConfigError::MissingRequiredParameter(
                "warehouse.dataset_id".to_string(),
            )));
        }

        if self.tables.is_empty() {
            return Err(ETLError::Config(ConfigError::InvalidValue {
                param: "tables".to_string(),
                value: "[]".to_string(),
            }));
        }

        if self.staging.retention_days == 0 {
            return Err(ETLError::Config(ConfigError::InvalidValue {
                param: "staging.retention_days".to_string(),
                value: "0".to_string(),
            }));
        }

        if self.warehouse.poll_interval_ms == 0 {
            return Err(ETLError::Config(ConfigError::InvalidValue {
                param: "warehouse.poll_interval_ms".to_string(),
                value: "0".to_string(),
            }));
        }

        Ok(())
    }

    /// Prazo de espera dos jobs de carga
    pub fn load_timeout(&self) -> Option<std::time::Duration> {
        match self.warehouse.load_timeout_seconds {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }

    /// Janela de retenção dos artefatos de staging
    pub fn retention(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.staging.retention_days * 24 * 60 * 60)
    }
}

/// Builder para configuração da rodada
#[derive(Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.config.warehouse.project_id = project_id.into();
        self
    }

    pub fn dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.config.warehouse.dataset_id = dataset_id.into();
        self
    }

    pub fn tables(mut self, tables: Vec<&str>) -> Self {
        self.config.tables = tables.into_iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging.dir = dir.into();
        self
    }

    pub fn staging_strategy(mut self, strategy: StagingStrategy) -> Self {
        self.config.staging.strategy = strategy;
        self
    }

    pub fn retention_days(mut self, days: u64) -> Self {
        self.config.staging.retention_days = days;
        self
    }

    pub fn load_timeout_seconds(mut self, timeout: u64) -> Self {
        self.config.warehouse.load_timeout_seconds = timeout;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Result<AppConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Credenciais do banco de origem
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Lê o arquivo `CHAVE=VALOR` com `DB_USR` e `DB_PWD`
    ///
    /// Cada linha é dividida no primeiro `=`; o valor é usado literalmente, sem
    /// expansão de variáveis, comentários ou escapes.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ETLError::Config(ConfigError::InvalidConfig(format!(
                "não foi possível ler as credenciais em {}: {}",
                path.display(),
                e
            )))
        })?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        let mut user = None;
        let mut password = None;
        for (key, value) in content.lines().filter_map(|line| line.split_once('=')) {
            match key.trim() {
                "DB_USR" => user = Some(value.trim().to_string()),
                "DB_PWD" => password = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let user = user.filter(|u| !u.is_empty()).ok_or_else(|| {
            ETLError::Config(ConfigError::MissingRequiredParameter("DB_USR".to_string()))
        })?;

        Ok(Self::new(user, password.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.staging.retention_days, 7);
        assert_eq!(config.staging.strategy, StagingStrategy::File);
        assert!(config.tables.contains(&"daily_log".to_string()));
        // sem project_id a configuração não é utilizável
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = AppConfig::builder()
            .project_id("inventario-prod")
            .tables(vec!["daily_log"])
            .staging_strategy(StagingStrategy::Memory)
            .load_timeout_seconds(0)
            .log_level("debug")
            .build()
            .unwrap();

        assert_eq!(config.warehouse.project_id, "inventario-prod");
        assert_eq!(config.tables, vec!["daily_log"]);
        assert!(config.load_timeout().is_none());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_validation() {
        let result = AppConfig::builder()
            .project_id("p")
            .retention_days(0)
            .build();
        assert!(result.is_err());

        let result = AppConfig::builder().project_id("p").tables(vec![]).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
        tables = ["daily_log", "backup_log"]

        [source]
        host = "db.interno"
        port = 3307

        [warehouse]
        project_id = "inventario-prod"
        load_timeout_seconds = 60

        [staging]
        dir = "/tmp/dumps"
        strategy = "direct"
        "#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.source.host, "db.interno");
        assert_eq!(config.source.port, 3307);
        assert_eq!(config.source.database, "ti_db_inventory");
        assert_eq!(config.staging.strategy, StagingStrategy::Direct);
        assert_eq!(config.load_timeout(), Some(std::time::Duration::from_secs(60)));
        assert_eq!(config.tables.len(), 2);
    }

    #[test]
    fn test_credentials_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "DB_USR=backup.user").unwrap();
        writeln!(file, "DB_PWD=s3cr3t").unwrap();

        let creds = Credentials::from_file(file.path()).unwrap();
        assert_eq!(creds.user, "backup.user");
        assert_eq!(creds.password, "s3cr3t");
        assert!(!format!("{:?}", creds).contains("s3cr3t"));
    }

    #[test]
    fn test_credentials_keep_password_literal() {
        for password in ["pa$word1", "ab #cd", "x\\ny", "'quoted", "a=b"] {
            let mut file = NamedTempFile::new().unwrap();
            writeln!(file, "DB_USR=backup.user").unwrap();
            writeln!(file, "DB_PWD={}", password).unwrap();

            let creds = Credentials::from_file(file.path()).unwrap();
            assert_eq!(creds.password, password);
        }
    }

    #[test]
    fn test_credentials_ignore_lines_without_separator() {
        let creds = Credentials::parse("# credenciais\n\n DB_USR = backup.user \nDB_PWD=s3cr3t\n")
            .unwrap();
        assert_eq!(creds.user, "backup.user");
        assert_eq!(creds.password, "s3cr3t");
    }

    #[test]
    fn test_credentials_missing_user() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "DB_PWD=s3cr3t").unwrap();

        let err = Credentials::from_file(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(Credentials::from_file("/nao/existe.conf").is_err());
    }
}
