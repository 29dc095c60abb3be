//! Vending machine role-play: tracks inventory, payment and change over several turns.

use turnbench_types::ExpectedPattern;

use crate::scenario::Scenario;

fn lit(value: &str) -> ExpectedPattern {
    ExpectedPattern::literal(value)
}

fn re(value: &str) -> ExpectedPattern {
    ExpectedPattern::regex(value)
}

pub fn basic() -> Scenario {
    Scenario::builder(
        "basic_vending_machine",
        "Simulate a vending machine that keeps inventory and change consistent",
    )
    .system_prompt(
        "You are a vending machine. You have the following items:
- A1: Chips ($1.50) - 3 in stock
- A2: Cookies ($2.00) - 2 in stock
- A3: Candy ($1.00) - 5 in stock
- B1: Water ($1.50) - 4 in stock
- B2: Soda ($2.50) - 1 in stock

Keep track of inventory and money. Only accept $1, $5, $10, and $20 bills.
Provide change when necessary. Update inventory after each purchase.
Always show remaining inventory when asked.",
    )
    .temperature(0.7)
    .max_tokens(500)
    .user_input(
        "Hi, what items do you have?",
        ["Chips", "Cookies", "Candy", "Water", "Soda"],
    )
    .user_input(
        "I'll take the chips (A1). Here's $5.",
        [lit("change"), lit("$3.50"), re(r"\$3\.50")],
    )
    .user_input("What's left in stock for A1?", [re(r"\b2\b|\btwo\b")])
    .user_input(
        "I'll buy 3 cookies (A2).",
        [re(r"only (2|two)|not enough|insufficient")],
    )
    .user_input(
        "Okay, I'll take 1 cookie then. Here's $5.",
        [lit("change"), re(r"\$3\.00")],
    )
    .build()
}

pub fn complex() -> Scenario {
    Scenario::builder(
        "complex_vending_machine",
        "Multiple purchases, change and transaction memory",
    )
    .system_prompt(
        "You are a vending machine with the following features:
- Track inventory for each item
- Accept bills: $1, $5, $10, $20
- Give exact change
- Allow refunds within the same session
- Maintain transaction history

Initial inventory:
- A1: Chocolate Bar ($2.50) - 10 in stock
- A2: Granola Bar ($3.00) - 8 in stock
- B1: Orange Juice ($3.50) - 5 in stock
- B2: Sports Drink ($4.00) - 3 in stock
- C1: Energy Bar ($4.50) - 6 in stock",
    )
    .temperature(0.7)
    .max_tokens(600)
    .user_input(
        "I want to buy 2 chocolate bars.",
        [re(r"\$5\.00|five dollars")],
    )
    .user_input("Here's $10.", [lit("change"), re(r"\$5\.00")])
    .user_input(
        "How many chocolate bars do you have left?",
        [re(r"\b8\b|\beight\b")],
    )
    .state_check(
        "Remaining stock is still reported consistently",
        [re(r"\b8\b|\beight\b")],
    )
    .user_input(
        "What did I buy so far?",
        [lit("chocolate"), re(r"\b2\b|\btwo\b")],
    )
    .build()
}

pub fn edge_cases() -> Scenario {
    Scenario::builder("edge_cases", "Out of stock items, invalid codes and underpayment")
        .system_prompt(
            "You are a vending machine. Inventory:
- A1: Gum ($0.50) - 2 in stock
- A2: Mints ($0.75) - 0 in stock (OUT OF STOCK)
- B1: Chips ($1.25) - 1 in stock

Handle errors gracefully for:
- Out of stock items
- Insufficient payment
- Invalid item codes
- Exact change scenarios",
        )
        .temperature(0.7)
        .user_input(
            "I want to buy A2.",
            [re(r"out of stock|not available|unavailable")],
        )
        .user_input(
            "Give me item Z9.",
            [re(r"invalid|not found|doesn't exist|does not exist")],
        )
        .user_input(
            "I'll take B1. Here's $1.",
            [re(r"insufficient|not enough|need")],
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::matches;

    #[test]
    fn test_builtin_regexes_compile() {
        for scenario in [basic(), complex(), edge_cases()] {
            for (i, turn) in scenario.turns().iter().enumerate() {
                for pattern in &turn.expected_patterns {
                    assert!(matches("", pattern, i).is_ok(), "{} turn {i}", scenario.name());
                }
            }
        }
    }

    #[test]
    fn test_complex_has_one_state_check() {
        let scenario = complex();
        assert_eq!(scenario.turns().len(), 5);
        assert_eq!(scenario.responding_turn_count(), 4);
    }
}
