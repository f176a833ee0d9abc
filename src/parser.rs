use once_cell::sync::Lazy;
use regex::Regex;

static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \u{00A0}]{2,}").unwrap());

/// Normalises extracted text: unix newlines, no tabs, trimmed non-empty lines,
/// collapsed space runs.
pub fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\t', " ")
        .split('\n')
        .map(|line| SPACE_RUNS.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
