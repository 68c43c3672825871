//! Inicialização do tracing com arquivo de log diário

use chrono::NaiveDate;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;

/// `<dir>/<prefixo>_<YYYY-MM-DD>.log`
pub fn log_file_path(config: &LoggingConfig, date: NaiveDate) -> PathBuf {
    config
        .dir
        .join(format!("{}_{}.log", config.file_prefix, date.format("%Y-%m-%d")))
}

/// Instala o subscriber global
///
/// Usa `RUST_LOG` quando definido, senão o nível configurado. Se o arquivo não puder
/// ser aberto, os logs vão para stderr. Retorna o caminho do arquivo em uso, ou `None`
/// quando os logs não vão para o arquivo (stderr, ou subscriber já instalado).
pub fn init(config: &LoggingConfig, date: NaiveDate) -> Option<PathBuf> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let path = log_file_path(config, date);

    let file = std::fs::create_dir_all(&config.dir).and_then(|_| {
        OpenOptions::new().create(true).append(true).open(&path)
    });

    match file {
        Ok(file) => {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            match installed {
                Ok(()) => Some(path),
                Err(e) => {
                    eprintln!(
                        "Subscriber de log já instalado, {} não será usado: {}",
                        path.display(),
                        e
                    );
                    None
                }
            }
        }
        Err(e) => {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
            if let Err(init_err) = installed {
                eprintln!("Subscriber de log já instalado: {}", init_err);
            }
            tracing::warn!(path = %path.display(), error = %e, "Arquivo de log indisponível, usando stderr");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path_uses_run_date() {
        let config = LoggingConfig::default();
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(
            log_file_path(&config, date),
            PathBuf::from("/backup/logs/MYSQL_to_BQ_2025-03-15.log")
        );
    }

    #[test]
    fn test_second_init_reports_file_not_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            dir: dir.path().join("logs"),
            file_prefix: "MYSQL_to_BQ".to_string(),
            level: "info".to_string(),
        };
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();

        let first = init(&config, date);
        assert_eq!(first, Some(log_file_path(&config, date)));
        assert!(log_file_path(&config, date).exists());

        // o subscriber global já existe; o segundo arquivo não recebe logs
        let other = LoggingConfig {
            file_prefix: "outro".to_string(),
            ..config
        };
        assert_eq!(init(&other, date), None);
    }
}
