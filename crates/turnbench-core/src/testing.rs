use anyhow::Result;
use turnbench_types::EvaluationResult;

use crate::runner::BenchReport;

/// Fails when a result's pass rate is below `min_pass_rate`.
///
/// Meant for `#[tokio::test]` functions that drive a model through a scenario.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn vending_machine_keeps_state() -> Result<()> {
///     let manager = ConversationManager::new(adapter);
///     let scenario = catalog::builtin("basic_vending_machine").unwrap();
///     let transcript = manager.run_scenario(&scenario).await?;
///     let result = Evaluator::new().evaluate(&transcript, &scenario)?;
///
///     assert_pass_rate(&result, 0.8)?;
///     Ok(())
/// }
/// ```
pub fn assert_pass_rate(result: &EvaluationResult, min_pass_rate: f64) -> Result<()> {
    if result.pass_rate() < min_pass_rate {
        anyhow::bail!(
            "Scenario {} failed: pass rate {:.1}% is below threshold {:.1}%\n{}",
            result.scenario_name(),
            result.pass_rate() * 100.0,
            min_pass_rate * 100.0,
            result.summary_table()
        );
    }
    Ok(())
}

pub fn assert_all_passed(result: &EvaluationResult) -> Result<()> {
    if !result.overall_passed() {
        anyhow::bail!(
            "Scenario {} failed: {}/{} metrics passed\n{}",
            result.scenario_name(),
            result.passed_count(),
            result.metrics().len(),
            result.summary_table()
        );
    }
    Ok(())
}

/// Fails when any scenario errored or did not pass.
pub fn assert_bench_passed(report: &BenchReport) -> Result<()> {
    if !report.all_passed() {
        anyhow::bail!("Bench failed\n{}", report.summary_table());
    }
    Ok(())
}
