//! # Staging
//!
//! Armazenamento transitório dos registros serializados antes do envio ao warehouse.
//!
//! Os artefatos de diretório seguem o padrão `<tabela>_<YYYYMMDD_HHMMSS>.json` e são
//! apagados depois do uso. A limpeza por retenção considera apenas arquivos `*.json`
//! do diretório, independentemente da rodada que os produziu.

use async_trait::async_trait;
use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use crate::error::{ETLError, Result, StagingError};
use crate::traits::{ArtifactHandle, StagingStore};

const ARTIFACT_EXTENSION: &str = "json";

fn io_error(artifact: impl Into<String>, source: std::io::Error) -> ETLError {
    ETLError::Staging(StagingError::Io {
        artifact: artifact.into(),
        source,
    })
}

fn is_older(mtime: SystemTime, age: Duration, now: SystemTime) -> bool {
    now.duration_since(mtime)
        .map(|elapsed| elapsed > age)
        .unwrap_or(false)
}

fn artifact_name(table: &str) -> String {
    format!(
        "{}_{}.{}",
        table,
        Local::now().format("%Y%m%d_%H%M%S"),
        ARTIFACT_EXTENSION
    )
}

/// Staging em diretório local
#[derive(Debug, Clone)]
pub struct DirectoryStaging {
    dir: PathBuf,
}

impl DirectoryStaging {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Caminho do artefato; rejeita ids que escapem do diretório
    fn path_of(&self, artifact: &ArtifactHandle) -> Result<PathBuf> {
        let name = Path::new(&artifact.id);
        if name.components().count() != 1 || name.file_name().is_none() {
            return Err(ETLError::Staging(StagingError::NotFound(artifact.id.clone())));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl StagingStore for DirectoryStaging {
    async fn write(&self, table: &str, records: &[u8]) -> Result<ArtifactHandle> {
        let id = artifact_name(table);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&id, e))?;

        let path = self.dir.join(&id);
        tokio::fs::write(&path, records)
            .await
            .map_err(|e| io_error(&id, e))?;

        tracing::debug!(artifact = %path.display(), bytes = records.len(), "Artefato gravado");
        Ok(ArtifactHandle { id })
    }

    async fn read(&self, artifact: &ArtifactHandle) -> Result<Vec<u8>> {
        let path = self.path_of(artifact)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ETLError::Staging(StagingError::NotFound(artifact.id.clone()))
            }
            _ => io_error(&artifact.id, e),
        })
    }

    async fn list_older_than(&self, age: Duration, now: SystemTime) -> Result<Vec<ArtifactHandle>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(self.dir.display().to_string(), e)),
        };

        let mut stale = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(self.dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }

            let metadata = entry
                .metadata()
                .await
                .map_err(|e| io_error(path.display().to_string(), e))?;
            if !metadata.is_file() {
                continue;
            }

            let mtime = metadata
                .modified()
                .map_err(|e| io_error(path.display().to_string(), e))?;
            if is_older(mtime, age, now) {
                stale.push(ArtifactHandle {
                    id: entry.file_name().to_string_lossy().into_owned(),
                });
            }
        }

        stale.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stale)
    }

    async fn delete(&self, artifact: &ArtifactHandle) -> Result<()> {
        let path = self.path_of(artifact)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&artifact.id, e)),
        }
    }
}

/// Staging em memória, com o mesmo contrato do diretório
#[derive(Debug, Clone, Default)]
pub struct MemoryStaging {
    artifacts: Arc<Mutex<HashMap<String, (Vec<u8>, SystemTime)>>>,
    sequence: Arc<Mutex<u64>>,
}

impl MemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insere um artefato com horário de modificação arbitrário
    pub fn insert_with_mtime(&self, id: impl Into<String>, records: Vec<u8>, mtime: SystemTime) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(id.into(), (records, mtime));
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StagingStore for MemoryStaging {
    async fn write(&self, table: &str, records: &[u8]) -> Result<ArtifactHandle> {
        let seq = {
            let mut sequence = self.sequence.lock().unwrap();
            *sequence += 1;
            *sequence
        };
        let id = format!("{}#{}", artifact_name(table), seq);
        self.insert_with_mtime(id.clone(), records.to_vec(), SystemTime::now());
        Ok(ArtifactHandle { id })
    }

    async fn read(&self, artifact: &ArtifactHandle) -> Result<Vec<u8>> {
        self.artifacts
            .lock()
            .unwrap()
            .get(&artifact.id)
            .map(|(records, _)| records.clone())
            .ok_or_else(|| ETLError::Staging(StagingError::NotFound(artifact.id.clone())))
    }

    async fn list_older_than(&self, age: Duration, now: SystemTime) -> Result<Vec<ArtifactHandle>> {
        let mut stale: Vec<ArtifactHandle> = self
            .artifacts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (_, mtime))| is_older(*mtime, age, now))
            .map(|(id, _)| ArtifactHandle { id: id.clone() })
            .collect();
        stale.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stale)
    }

    async fn delete(&self, artifact: &ArtifactHandle) -> Result<()> {
        self.artifacts.lock().unwrap().remove(&artifact.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60;

    #[tokio::test]
    async fn test_directory_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let staging = DirectoryStaging::new(dir.path().join("dumps"));

        let artifact = staging.write("daily_log", b"{\"a\":1}\n").await.unwrap();
        assert!(artifact.id.starts_with("daily_log_"));
        assert!(artifact.id.ends_with(".json"));
        assert_eq!(staging.read(&artifact).await.unwrap(), b"{\"a\":1}\n".to_vec());

        staging.delete(&artifact).await.unwrap();
        let err = staging.read(&artifact).await.unwrap_err();
        assert_eq!(err.error_code(), "STAGING_IO_ERROR");
        // apagar de novo não é erro
        staging.delete(&artifact).await.unwrap();
    }

    #[tokio::test]
    async fn test_directory_retention_uses_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let old = dir.path().join("daily_log_20250301_000000.json");
        let recent = dir.path().join("daily_log_20250309_000000.json");
        let other = dir.path().join("notes.txt");
        for path in [&old, &recent, &other] {
            std::fs::write(path, b"x").unwrap();
        }
        for (path, days) in [(&old, 8), (&recent, 6), (&other, 30)] {
            std::fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(now - Duration::from_secs(days * DAY))
                .unwrap();
        }

        let staging = DirectoryStaging::new(dir.path());
        let stale = staging
            .list_older_than(Duration::from_secs(7 * DAY), now)
            .await
            .unwrap();

        assert_eq!(
            stale,
            vec![ArtifactHandle {
                id: "daily_log_20250301_000000.json".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_has_nothing_to_clean() {
        let dir = tempfile::tempdir().unwrap();
        let staging = DirectoryStaging::new(dir.path().join("nope"));
        let stale = staging
            .list_older_than(Duration::from_secs(DAY), SystemTime::now())
            .await
            .unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let staging = DirectoryStaging::new(dir.path());
        let err = staging
            .read(&ArtifactHandle {
                id: "../etc/passwd".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "STAGING_IO_ERROR");
    }

    #[tokio::test]
    async fn test_memory_staging_retention() {
        let staging = MemoryStaging::new();
        let now = SystemTime::now();
        staging.insert_with_mtime("a.json", vec![], now - Duration::from_secs(8 * DAY));
        staging.insert_with_mtime("b.json", vec![], now - Duration::from_secs(6 * DAY));
        let written = staging.write("servers_temp", b"x").await.unwrap();

        let stale = staging
            .list_older_than(Duration::from_secs(7 * DAY), now)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "a.json");
        assert_eq!(staging.read(&written).await.unwrap(), b"x".to_vec());
        assert_eq!(staging.len(), 3);
    }
}
