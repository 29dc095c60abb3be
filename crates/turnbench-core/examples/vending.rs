use std::sync::Arc;

use turnbench_core::{catalog, validator, ConversationManager, Evaluator, ExpectedPattern, MockAdapter, Scenario};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: a scripted model against an inline scenario
    let adapter = Arc::new(MockAdapter::scripted(
        "scripted",
        ["The answer is 8.", "10 - 2 = 8", "Yes, both results are 8, so they are the same."],
    ));
    let scenario = Scenario::builder("arithmetic", "Two sums that must agree")
        // every listed pattern must match, so alternatives share one regex
        .user_input("What is 5 + 3?", [ExpectedPattern::regex(r"8|eight")])
        .user_input("What is 10 - 2?", [ExpectedPattern::regex(r"8|eight")])
        .user_input("Are both results the same?", [ExpectedPattern::regex(r"yes|same|equal")])
        .validator(validator::labeled("never apologises", |transcript, _scenario| {
            Ok(transcript.responses.iter().all(|r| !r.content.to_lowercase().contains("sorry")))
        }))
        .build();

    let manager = ConversationManager::new(adapter);
    let transcript = manager.run_scenario(&scenario).await?;
    let result = Evaluator::new().evaluate(&transcript, &scenario)?;
    println!("{}", result.summary_table());

    // Example 2: a built-in scenario, named on the command line
    if let Some(name) = std::env::args().nth(1) {
        let scenario = catalog::builtin(&name).ok_or_else(|| anyhow::anyhow!("unknown scenario {name}"))?;
        let manager = ConversationManager::new(Arc::new(MockAdapter::default()));
        let transcript = manager.run_scenario(&scenario).await?;
        let result = Evaluator::new().evaluate(&transcript, &scenario)?;
        println!("{}", result.summary_table());
    }

    Ok(())
}
