use strand_core::error::{Result, StrandError};
use strand_core::types::input_key;
use strand_core::workflow::StepDefinition;

use crate::state::RunState;

/// Return the user input supplied for this step.
pub fn execute(step: &StepDefinition, state: &RunState) -> Result<serde_json::Value> {
    let key = input_key(&step.id);
    state
        .get(&key)
        .cloned()
        .ok_or(StrandError::MissingInput(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_core::workflow::StepKind;

    #[test]
    fn reads_reserved_input_key() {
        let mut state = RunState::new();
        state.set("__input__topic", json!("ownership"));
        let step = StepDefinition::new("topic", StepKind::Intake);
        assert_eq!(execute(&step, &state).unwrap(), json!("ownership"));
    }

    #[test]
    fn missing_input() {
        let step = StepDefinition::new("topic", StepKind::Intake);
        let err = execute(&step, &RunState::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing input (expected state key __input__topic)"
        );
    }
}
