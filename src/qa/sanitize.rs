use std::sync::LazyLock;

use regex::Regex;

/// Opening fence with an optional language tag: ```json, ```python, ```
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("fence pattern is valid"));

fn strip_once(text: &str) -> String {
    let without_fences = FENCE.replace_all(text, "");
    without_fences.replace("```", "").trim().to_string()
}

/// Strip code-fence decoration from model output and trim it.
///
/// Runs to a fixed point, so removing one fence can never expose another
/// and `sanitize(sanitize(x)) == sanitize(x)` holds for every input.
pub fn sanitize(text: &str) -> String {
    let mut current = strip_once(text);
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_json_fence() {
        assert_eq!(sanitize("```json\n[{\"a\":1}]\n```"), "[{\"a\":1}]");
    }

    #[test]
    fn test_fenced_equals_unfenced() {
        let body = "{\"Test_ID\": \"TC1\"}";
        assert_eq!(sanitize(&format!("```json\n{}\n```", body)), sanitize(body));
    }

    #[test]
    fn test_strips_python_fence_and_whitespace() {
        let raw = "\n\n```python\nprint('TEST PASSED')\n```\n  ";
        assert_eq!(sanitize(raw), "print('TEST PASSED')");
    }

    #[test]
    fn test_plain_text_only_trimmed() {
        assert_eq!(sanitize("  not json \n"), "not json");
        assert_eq!(sanitize("use `code` here"), "use `code` here");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "",
            "```",
            "``````",
            "`````a``",
            "````json`",
            "``` ```x ```",
            "```json\n[1, 2]\n```\ntrailing ``` text",
            " ``\n```py\n` code `\n```\n",
            "a``````b",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", sample);
            assert!(!once.contains("```"), "fence left in {:?}", once);
        }
    }
}
