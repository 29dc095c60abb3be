use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use turnbench_types::{EvaluationResult, ResultDocument, Transcript};

use crate::runner::aggregate_pass_rate;

const FILE_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

async fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}

pub async fn save_evaluation_result(result: &EvaluationResult, path: impl AsRef<Path>) -> Result<()> {
    write_json(result, path.as_ref()).await
}

pub async fn save_transcript(transcript: &Transcript, path: impl AsRef<Path>) -> Result<()> {
    write_json(transcript, path.as_ref()).await
}

/// Writes `{prefix}_{i}_{timestamp}.json` for each result plus a
/// `{prefix}_summary_{timestamp}.json` document, and returns the summary path.
pub async fn save_batch_results(
    results: &[EvaluationResult],
    dir: impl AsRef<Path>,
    prefix: &str,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let timestamp = Utc::now().format(FILE_TIMESTAMP).to_string();

    for (i, result) in results.iter().enumerate() {
        save_evaluation_result(result, dir.join(batch_file_name(prefix, i, &timestamp))).await?;
    }

    let summary = json!({
        "timestamp": timestamp,
        "num_results": results.len(),
        "results": results,
        "aggregate_pass_rate": aggregate_pass_rate(results),
    });
    let summary_path = dir.join(format!("{prefix}_summary_{timestamp}.json"));
    write_json(&summary, &summary_path).await?;
    Ok(summary_path)
}

/// Writes `{prefix}_{i}_{timestamp}.json` for each transcript, in order.
pub async fn save_batch_transcripts<'a, I>(transcripts: I, dir: impl AsRef<Path>, prefix: &str) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = &'a Transcript>,
{
    let dir = dir.as_ref();
    let timestamp = Utc::now().format(FILE_TIMESTAMP).to_string();
    let mut paths = Vec::new();
    for (i, transcript) in transcripts.into_iter().enumerate() {
        let path = dir.join(batch_file_name(prefix, i, &timestamp));
        save_transcript(transcript, &path).await?;
        paths.push(path);
    }
    Ok(paths)
}

fn batch_file_name(prefix: &str, index: usize, timestamp: &str) -> String {
    format!("{prefix}_{index}_{timestamp}.json")
}

pub async fn load_evaluation_result(path: impl AsRef<Path>) -> Result<ResultDocument> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid evaluation result {:?}", path))
}

pub async fn load_transcript(path: impl AsRef<Path>) -> Result<Transcript> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid transcript {:?}", path))
}
