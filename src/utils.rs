use crossterm::style::Stylize;
use regex::Regex;

use crate::types::TargetRecord;

/// Build a single alternation that matches any of the given names literally.
pub fn name_pattern(names: &[String]) -> Result<Regex, regex::Error> {
    let alternation = names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation)
}

/// Select every target whose name contains one of the given names.
pub fn select_targets(
    targets: Vec<TargetRecord>,
    names: &[String],
) -> Result<Vec<TargetRecord>, regex::Error> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = name_pattern(names)?;
    Ok(targets
        .into_iter()
        .filter(|t| pattern.is_match(&t.name))
        .collect())
}

/// Header line identifying the source of the lines that follow.
pub fn source_header(source: &str, color: bool) -> String {
    let head = format!("[{}]", source);
    if color {
        head.yellow().to_string()
    } else {
        head
    }
}
