//! services/api/src/adapters/academy_file.rs
//!
//! Loads and saves the academy facts (`academy_data.json`).

use academy_core::domain::AcademyData;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct AcademyFile {
    path: PathBuf,
}

impl AcademyFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored facts, or the built-in defaults when the file is missing or
    /// unreadable. Fields absent from the file take their default values.
    pub async fn load(&self) -> AcademyData {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(data) => {
                    info!(path = %self.path.display(), "academy data loaded");
                    data
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "academy data is not valid JSON, using defaults");
                    AcademyData::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => AcademyData::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "academy data unreadable, using defaults");
                AcademyData::default()
            }
        }
    }

    /// Writes to a sibling temp file and renames it over the target.
    pub async fn save(&self, data: &AcademyData) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(data).map_err(io::Error::other)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        info!(path = %self.path.display(), "academy data saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("academy-{}-{}.json", name, rand::random::<u32>()))
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let file = AcademyFile::new(temp_path("missing"));
        assert_eq!(file.load().await, AcademyData::default());
    }

    #[tokio::test]
    async fn save_then_load() {
        let path = temp_path("roundtrip");
        let file = AcademyFile::new(path.clone());
        let data = AcademyData {
            phone: "0100".to_string(),
            offers: vec!["خصم 20%".to_string()],
            ..AcademyData::default()
        };
        file.save(&data).await.unwrap();
        assert_eq!(file.load().await, data);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults_for_missing_fields() {
        let path = temp_path("partial");
        std::fs::write(&path, r#"{"phone": "0111"}"#).unwrap();
        let loaded = AcademyFile::new(path.clone()).load().await;
        assert_eq!(loaded.phone, "0111");
        assert_eq!(loaded.academy_name, AcademyData::default().academy_name);
        let _ = std::fs::remove_file(path);
    }
}
