use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::state::RunState;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{(\w+(?:\.\w+)*)\}\}").expect("template placeholder pattern is valid")
    })
}

/// Replace `{{id}}` and `{{id.sub}}` placeholders with the text of the value
/// stored under `id`. Placeholders whose `id` is absent are left verbatim.
pub fn resolve(template: &str, state: &RunState) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &Captures| {
            let path = &caps[1];
            let root = path.split('.').next().unwrap_or(path);
            match state.get_text(root) {
                Some(text) => text,
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
