use strand_core::error::{Result, StrandError};
use strand_core::workflow::StepDefinition;

use crate::state::RunState;

/// Join every non-empty string output, ordered by key, with blank lines.
///
/// The step's own previous output (from an earlier loop pass) is ignored.
pub fn execute(step: &StepDefinition, state: &RunState) -> Result<serde_json::Value> {
    let parts: Vec<&str> = state
        .output_keys()
        .into_iter()
        .filter(|key| *key != step.id)
        .filter_map(|key| state.get_str(key))
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(StrandError::NoData);
    }
    Ok(serde_json::Value::String(parts.join("\n\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_core::workflow::StepKind;

    fn step() -> StepDefinition {
        StepDefinition::new("out", StepKind::Aggregator)
    }

    #[test]
    fn sorted_by_key() {
        let mut state = RunState::new();
        state.set_str("b", "y");
        state.set_str("a", "x");
        assert_eq!(execute(&step(), &state).unwrap(), json!("x\n\ny"));
    }

    #[test]
    fn skips_reserved_empty_and_non_string_values() {
        let mut state = RunState::new();
        state.set_str("__input__a", "hidden");
        state.set_str("empty", "");
        state.set("count", json!(3));
        state.set_str("out", "previous pass");
        state.set_str("z", "kept");
        assert_eq!(execute(&step(), &state).unwrap(), json!("kept"));
    }

    #[test]
    fn no_data() {
        let mut state = RunState::new();
        state.set_str("__input__a", "hidden");
        let err = execute(&step(), &state).unwrap_err();
        assert_eq!(err.to_string(), "no data to output");
    }
}
