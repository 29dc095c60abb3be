use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::scenario::{Scenario, ScenarioFile};

#[async_trait]
pub trait ScenarioSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Scenario>>;
}

pub struct StaticScenarios {
    scenarios: Vec<Scenario>,
}

impl StaticScenarios {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }
}

#[async_trait]
impl ScenarioSource for StaticScenarios {
    async fn load(&self) -> Result<Vec<Scenario>> {
        Ok(self.scenarios.clone())
    }
}

/// Reads scenario definitions from a YAML or JSON file, or from every
/// `.yaml`/`.yml`/`.json` file of a directory (sorted by file name).
///
/// A file holds either a single `{config, turns}` document or a list of them.
pub struct FileScenarioSource {
    path: PathBuf,
}

impl FileScenarioSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(ScenarioFile),
    Many(Vec<ScenarioFile>),
}

pub fn parse_scenarios(content: &str) -> Result<Vec<ScenarioFile>> {
    let parsed: OneOrMany = serde_yaml::from_str(content)?;
    Ok(match parsed {
        OneOrMany::One(file) => vec![file],
        OneOrMany::Many(files) => files,
    })
}

#[async_trait]
impl ScenarioSource for FileScenarioSource {
    async fn load(&self) -> Result<Vec<Scenario>> {
        let files = if tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("Failed to stat {:?}", self.path))?
            .is_dir()
        {
            scenario_files_in(&self.path).await?
        } else {
            vec![self.path.clone()]
        };

        let mut scenarios = Vec::new();
        for path in files {
            let content = tokio_fs_read_to_string(&path).await?;
            let parsed = parse_scenarios(&content)
                .with_context(|| format!("Invalid scenario file {:?}", path))?;
            if parsed.is_empty() {
                return Err(anyhow!("{:?}: no scenarios defined", path));
            }
            scenarios.extend(parsed.into_iter().map(ScenarioFile::into_scenario));
        }
        Ok(scenarios)
    }
}

async fn scenario_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {:?}", dir))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_scenario = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml" | "json")
        );
        if is_scenario {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(not(feature = "sync-fs"))]
async fn tokio_fs_read_to_string(path: &Path) -> Result<String> {
    use tokio::fs;
    Ok(fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?)
}

#[cfg(feature = "sync-fs")]
async fn tokio_fs_read_to_string(path: &Path) -> Result<String> {
    use std::fs;
    use tokio::task;
    let path_clone = path.to_path_buf();
    let content = task::spawn_blocking(move || {
        fs::read_to_string(&path_clone).with_context(|| format!("Failed to read {:?}", path_clone))
    })
    .await
    .map_err(|e| anyhow!(e))??;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
- config:
    name: first
    description: one
  turns:
    - content: hi
      expected_patterns: [hello]
- config:
    name: second
  turns: []
"#;

    #[test]
    fn test_parse_list_and_single() {
        let files = parse_scenarios(YAML).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].config.name, "second");

        let json = r#"{"config": {"name": "solo"}, "turns": [{"content": "q"}]}"#;
        let files = parse_scenarios(json).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].turns.len(), 1);
    }

    #[tokio::test]
    async fn test_load_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), YAML).unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"config": {"name": "alpha"}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = FileScenarioSource::new(dir.path()).load().await.unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["alpha", "first", "second"]);
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let source = FileScenarioSource::new("/definitely/not/here.yaml");
        assert!(source.load().await.is_err());
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticScenarios::new(crate::catalog::all_builtin());
        assert_eq!(source.load().await.unwrap().len(), 3);
    }
}
