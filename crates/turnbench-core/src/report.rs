use serde_json::Value;
use turnbench_types::EvaluationResult;

use crate::runner::aggregate_pass_rate;

fn rate_class(rate: f64) -> &'static str {
    if rate >= 0.8 {
        "good"
    } else if rate >= 0.5 {
        "warn"
    } else {
        "bad"
    }
}

fn scenario_section(result: &EvaluationResult) -> String {
    let mut rows = String::new();
    for metric in result.metrics() {
        let row_class = if metric.passed { "pass" } else { "fail" };
        let icon = if metric.passed { "✓" } else { "✗" };
        let details = serde_json::to_string_pretty(&Value::Object(metric.details.clone())).unwrap_or_default();
        rows.push_str(&format!(
            r#"
                <tr class="{}">
                    <td>{}</td>
                    <td class="icon">{}</td>
                    <td class="value">{:.3}</td>
                    <td><pre>{}</pre></td>
                </tr>"#,
            row_class,
            html_escape(&metric.name),
            icon,
            metric.value,
            html_escape(&details)
        ));
    }

    let status = if result.overall_passed() { "pass" } else { "fail" };
    format!(
        r#"
        <section class="scenario">
            <h2><span class="badge {}">{}</span> {}</h2>
            <div class="meta">Model: {} • Evaluated: {} • Pass rate: <span class="{}">{:.1}%</span> ({}/{})</div>
            <table>
                <thead>
                    <tr><th>Metric</th><th>Status</th><th>Value</th><th>Details</th></tr>
                </thead>
                <tbody>{}
                </tbody>
            </table>
        </section>"#,
        status,
        if result.overall_passed() { "PASS" } else { "FAIL" },
        html_escape(result.scenario_name()),
        html_escape(result.model_name()),
        result.evaluated_at().format("%Y-%m-%d %H:%M:%S UTC"),
        rate_class(result.pass_rate()),
        result.pass_rate() * 100.0,
        result.passed_count(),
        result.metrics().len(),
        rows
    )
}

/// Renders a single self-contained HTML page, one table per scenario.
pub fn generate_html_report(results: &[EvaluationResult]) -> String {
    let sections: String = results.iter().map(scenario_section).collect();
    let passed = results.iter().filter(|r| r.overall_passed()).count();
    let aggregate = aggregate_pass_rate(results);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Turnbench Report</title>
    <style>
        * {{ box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
        }}
        .container {{
            max-width: 1200px;
            margin: 0 auto;
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{ margin: 0 0 10px 0; color: #333; }}
        h2 {{ font-size: 18px; margin: 30px 0 6px 0; color: #333; }}
        .timestamp, .meta {{ color: #6c757d; font-size: 14px; }}
        .summary {{
            display: flex;
            gap: 20px;
            margin: 20px 0;
            padding: 20px;
            background: #f8f9fa;
            border-radius: 6px;
        }}
        .summary-item {{ flex: 1; }}
        .summary-label {{
            font-size: 12px;
            color: #666;
            text-transform: uppercase;
            letter-spacing: 0.5px;
            margin-bottom: 5px;
        }}
        .summary-value {{ font-size: 28px; font-weight: 600; color: #333; }}
        .good {{ color: #28a745; }}
        .warn {{ color: #ffc107; }}
        .bad {{ color: #dc3545; }}
        table {{ width: 100%; border-collapse: collapse; margin-top: 12px; }}
        th {{
            background: #343a40;
            color: white;
            padding: 10px;
            text-align: left;
            font-size: 13px;
            text-transform: uppercase;
        }}
        td {{ padding: 10px; border-bottom: 1px solid #dee2e6; vertical-align: top; }}
        tr.pass {{ background: #f0f9f4; }}
        tr.fail {{ background: #fef3f2; }}
        .icon {{ text-align: center; width: 60px; }}
        .value {{ font-weight: 600; color: #495057; width: 80px; }}
        pre {{
            margin: 0;
            padding: 8px;
            background: #f8f9fa;
            border-radius: 4px;
            font-size: 12px;
            max-height: 150px;
            overflow: auto;
            white-space: pre-wrap;
            word-break: break-word;
        }}
        .badge {{ padding: 3px 8px; border-radius: 4px; font-size: 12px; }}
        .badge.pass {{ background: #d4edda; color: #155724; }}
        .badge.fail {{ background: #f8d7da; color: #721c24; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Turnbench Report</h1>
        <div class="timestamp">Generated: {}</div>
        <div class="summary">
            <div class="summary-item">
                <div class="summary-label">Scenarios</div>
                <div class="summary-value">{}</div>
            </div>
            <div class="summary-item">
                <div class="summary-label">Passed</div>
                <div class="summary-value good">{}</div>
            </div>
            <div class="summary-item">
                <div class="summary-label">Failed</div>
                <div class="summary-value bad">{}</div>
            </div>
            <div class="summary-item">
                <div class="summary-label">Aggregate Pass Rate</div>
                <div class="summary-value {}">{:.1}%</div>
            </div>
        </div>
        {}
    </div>
</body>
</html>"#,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        results.len(),
        passed,
        results.len() - passed,
        rate_class(aggregate),
        aggregate * 100.0,
        sections
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turnbench_types::EvaluationMetric;

    #[test]
    fn test_report_lists_scenarios_and_escapes() {
        let result = EvaluationResult::builder("<vending>", "mock-model")
            .metric(EvaluationMetric::new("pattern_match_turn_0", 1.0, true))
            .unwrap()
            .metric(EvaluationMetric::new("validator_0", 0.0, false).with_detail("error", json!("a & b")))
            .unwrap()
            .finish();
        let html = generate_html_report(&[result]);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("&lt;vending&gt;"));
        assert!(!html.contains("<vending>"));
        assert!(html.contains("pattern_match_turn_0"));
        assert!(html.contains("a &amp; b"));
        assert!(html.contains("50.0%"));
    }

    #[test]
    fn test_empty_report() {
        let html = generate_html_report(&[]);
        assert!(html.contains("Turnbench Report"));
        assert!(html.contains("0.0%"));
    }
}
