//! Prompt template rendering.

use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid placeholder regex"))
}

/// Replace every `{{name}}` token in `template` with the matching input
/// value. An unmatched token renders as the empty string; that is defined
/// policy, not an error.
pub fn render(template: &str, inputs: &HashMap<String, String>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            inputs.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_matching_variable() {
        assert_eq!(render("Hi {{x}}", &inputs(&[("x", "Bob")])), "Hi Bob");
    }

    #[test]
    fn unmatched_variable_renders_empty() {
        assert_eq!(render("Hi {{x}}", &inputs(&[])), "Hi ");
    }

    #[test]
    fn multiple_and_repeated_variables() {
        let out = render(
            "{{greeting}}, {{name}}! Welcome back, {{name}}.",
            &inputs(&[("greeting", "Hello"), ("name", "Ada")]),
        );
        assert_eq!(out, "Hello, Ada! Welcome back, Ada.");
    }

    #[test]
    fn whitespace_inside_braces_tolerated() {
        assert_eq!(render("Hi {{ x }}", &inputs(&[("x", "Bob")])), "Hi Bob");
    }

    #[test]
    fn text_without_placeholders_passes_through() {
        assert_eq!(render("no variables here", &inputs(&[("x", "y")])), "no variables here");
    }
}
