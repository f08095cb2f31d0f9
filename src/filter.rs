use regex::{Regex, RegexBuilder};

pub fn build_filter(pattern: Option<&str>) -> anyhow::Result<Option<Regex>> {
    match pattern {
        Some(p) if !p.is_empty() => Ok(Some(RegexBuilder::new(p).case_insensitive(true).build()?)),
        _ => Ok(None),
    }
}

/// No filter lets every line through.
pub fn line_matches(text: &str, re: Option<&Regex>) -> bool {
    re.is_none_or(|r| r.is_match(text))
}
