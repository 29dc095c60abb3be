use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use turnbench_types::{EvaluationMetric, EvaluationResult};

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntity {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// One stored evaluation result, without its metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationEntity {
    pub id: i64,
    pub run_id: i64,
    pub scenario_name: String,
    pub model_name: String,
    pub overall_passed: bool,
    pub pass_rate: f64,
    pub evaluated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl Store {
    /// Open a store at the given path (e.g. "turnbench.db"), or ":memory:".
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("store connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL,
                metadata TEXT
            );
            CREATE TABLE IF NOT EXISTS evaluations (
                id INTEGER PRIMARY KEY,
                run_id INTEGER NOT NULL,
                scenario_name TEXT NOT NULL,
                model_name TEXT NOT NULL,
                overall_passed BOOLEAN NOT NULL,
                pass_rate REAL NOT NULL,
                evaluated_at TEXT NOT NULL,
                metadata TEXT NOT NULL,
                FOREIGN KEY(run_id) REFERENCES runs(id)
            );
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY,
                evaluation_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                value REAL NOT NULL,
                passed BOOLEAN NOT NULL,
                details TEXT NOT NULL,
                FOREIGN KEY(evaluation_id) REFERENCES evaluations(id)
            );",
        )?;
        Ok(())
    }

    pub fn create_run(&self, metadata: Option<serde_json::Value>) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (created_at, metadata) VALUES (?1, ?2)",
            params![Utc::now().to_rfc3339(), metadata.map(|v| v.to_string())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_run(&self, run_id: i64) -> Result<RunEntity> {
        let conn = self.lock()?;
        let (created_at, metadata): (String, Option<String>) = conn.query_row(
            "SELECT created_at, metadata FROM runs WHERE id = ?1",
            params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(RunEntity {
            id: run_id,
            created_at: parse_timestamp(&created_at)?,
            metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
        })
    }

    /// Save an evaluation result and its metrics in one transaction.
    pub fn save_evaluation(&self, run_id: i64, result: &EvaluationResult) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO evaluations
                (run_id, scenario_name, model_name, overall_passed, pass_rate, evaluated_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                result.scenario_name(),
                result.model_name(),
                result.overall_passed(),
                result.pass_rate(),
                result.evaluated_at().to_rfc3339(),
                serde_json::Value::Object(result.metadata().clone()).to_string(),
            ],
        )?;
        let evaluation_id = tx.last_insert_rowid();

        for (position, metric) in result.metrics().iter().enumerate() {
            tx.execute(
                "INSERT INTO metrics (evaluation_id, position, name, value, passed, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    evaluation_id,
                    position as i64,
                    metric.name,
                    metric.value,
                    metric.passed,
                    serde_json::Value::Object(metric.details.clone()).to_string(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(evaluation_id)
    }

    pub fn list_evaluations(&self, run_id: i64) -> Result<Vec<EvaluationEntity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, scenario_name, model_name, overall_passed, pass_rate, evaluated_at, metadata
             FROM evaluations WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut evaluations = Vec::new();
        for row in rows {
            let (id, scenario_name, model_name, overall_passed, pass_rate, evaluated_at, metadata) = row?;
            evaluations.push(EvaluationEntity {
                id,
                run_id,
                scenario_name,
                model_name,
                overall_passed,
                pass_rate,
                evaluated_at: parse_timestamp(&evaluated_at)?,
                metadata: serde_json::from_str(&metadata)?,
            });
        }
        Ok(evaluations)
    }

    /// Metrics of one evaluation, in their original order.
    pub fn metrics_for(&self, evaluation_id: i64) -> Result<Vec<EvaluationMetric>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name, value, passed, details FROM metrics
             WHERE evaluation_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![evaluation_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut metrics = Vec::new();
        for row in rows {
            let (name, value, passed, details) = row?;
            metrics.push(EvaluationMetric {
                name,
                value,
                passed,
                details: serde_json::from_str(&details)?,
            });
        }
        Ok(metrics)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EvaluationResult {
        EvaluationResult::builder("basic_vending_machine", "mock-model")
            .metadata("responding_turns", json!(2))
            .metric(EvaluationMetric::new("pattern_match_turn_0", 1.0, true))
            .unwrap()
            .metric(
                EvaluationMetric::new("pattern_match_turn_1", 0.5, false)
                    .with_detail("missing", json!(["$3.50"])),
            )
            .unwrap()
            .finish()
    }

    #[test]
    fn test_save_and_read_back() {
        let store = Store::open(":memory:").unwrap();
        let run_id = store.create_run(Some(json!({"model": "mock-model"}))).unwrap();
        let result = sample();
        let evaluation_id = store.save_evaluation(run_id, &result).unwrap();

        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.metadata, Some(json!({"model": "mock-model"})));

        let evaluations = store.list_evaluations(run_id).unwrap();
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].id, evaluation_id);
        assert_eq!(evaluations[0].scenario_name, "basic_vending_machine");
        assert!(!evaluations[0].overall_passed);
        assert_eq!(evaluations[0].pass_rate, 0.5);
        assert_eq!(evaluations[0].metadata["responding_turns"], 2);

        let metrics = store.metrics_for(evaluation_id).unwrap();
        assert_eq!(metrics, result.metrics());
    }

    #[test]
    fn test_runs_are_separate() {
        let store = Store::open(":memory:").unwrap();
        let first = store.create_run(None).unwrap();
        let second = store.create_run(None).unwrap();
        store.save_evaluation(first, &sample()).unwrap();

        assert_eq!(store.list_evaluations(first).unwrap().len(), 1);
        assert!(store.list_evaluations(second).unwrap().is_empty());
        assert!(store.get_run(second).unwrap().metadata.is_none());
    }
}
