use crate::scenario::Scenario;
use crate::scenarios::vending;

/// Names of the scenarios shipped with the crate, in listing order.
pub const BUILTIN_NAMES: [&str; 3] = ["basic_vending_machine", "complex_vending_machine", "edge_cases"];

pub fn builtin(name: &str) -> Option<Scenario> {
	match name {
		"basic_vending_machine" => Some(vending::basic()),
		"complex_vending_machine" => Some(vending::complex()),
		"edge_cases" => Some(vending::edge_cases()),
		_ => None,
	}
}

pub fn all_builtin() -> Vec<Scenario> {
	BUILTIN_NAMES.iter().filter_map(|name| builtin(name)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_every_name_resolves() {
		for name in BUILTIN_NAMES {
			let scenario = builtin(name).unwrap();
			assert_eq!(scenario.name(), name);
			assert!(scenario.system_message().is_some());
		}
		assert!(builtin("nope").is_none());
		assert_eq!(all_builtin().len(), BUILTIN_NAMES.len());
	}
}
