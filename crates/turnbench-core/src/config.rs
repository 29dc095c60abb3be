use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapter::ModelAdapter;
use crate::adapters::mock::MockAdapter;
use crate::adapters::openai::{OpenAiAdapter, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL};
use crate::catalog;
use crate::datasource::{FileScenarioSource, ScenarioSource};
use crate::scenario::Scenario;

/// A benchmark run, usually read from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub adapter: AdapterConfig,
    pub scenarios: Vec<ScenarioRef>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum AdapterConfig {
    Mock {
        #[serde(default = "default_mock_model")]
        model: String,
        #[serde(default)]
        responses: Vec<String>,
    },
    #[serde(rename = "openai")]
    OpenAi {
        model: String,
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
    },
}

fn default_mock_model() -> String {
    "mock-model".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ScenarioRef {
    Builtin { name: String },
    File { path: PathBuf },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub json_dir: Option<PathBuf>,
    #[serde(default)]
    pub html: Option<PathBuf>,
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(s)?;
        if config.scenarios.is_empty() {
            return Err(anyhow!("run config lists no scenarios"));
        }
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid run config {:?}", path))
    }

    pub fn build_adapter(&self) -> Result<Arc<dyn ModelAdapter>> {
        Ok(match &self.adapter {
            AdapterConfig::Mock { model, responses } => {
                Arc::new(MockAdapter::scripted(model.clone(), responses.clone()))
            }
            AdapterConfig::OpenAi { model, base_url, api_key_env } => {
                Arc::new(OpenAiAdapter::from_env(model.clone(), api_key_env)?.with_base_url(base_url.clone()))
            }
        })
    }

    /// Resolves every scenario reference, in order.
    pub async fn load_scenarios(&self) -> Result<Vec<Scenario>> {
        let mut scenarios = Vec::new();
        for scenario_ref in &self.scenarios {
            match scenario_ref {
                ScenarioRef::Builtin { name } => {
                    let scenario = catalog::builtin(name)
                        .ok_or_else(|| anyhow!("unknown builtin scenario {:?}", name))?;
                    scenarios.push(scenario);
                }
                ScenarioRef::File { path } => {
                    scenarios.extend(FileScenarioSource::new(path).load().await?);
                }
            }
        }
        Ok(scenarios)
    }
}
