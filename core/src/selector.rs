//! Element selector grammar.
//!
//! Selectors are prefix-tagged: `role:`, `text:`, `textContains:`,
//! `textRegex:`. A bare string is shorthand for a role. Regex patterns are
//! validated here so invalid ones fail the request instead of the
//! traversal.

use regex_lite::Regex;

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::platform::ElementQuery;

pub fn parse_selector(raw: &str) -> Result<ElementQuery> {
    if raw.is_empty() {
        return Err(AutomationError::required_field("selector"));
    }
    if let Some(pattern) = raw.strip_prefix("textRegex:") {
        if Regex::new(pattern).is_err() {
            return Err(AutomationError::invalid_argument_with(
                reason::INVALID_SELECTOR,
                format!("invalid selector regex {pattern:?}"),
                [("pattern", pattern.to_string())],
            ));
        }
        return Ok(ElementQuery::TextRegex(pattern.to_string()));
    }
    if let Some(text) = raw.strip_prefix("textContains:") {
        return Ok(ElementQuery::TextContains(text.to_string()));
    }
    if let Some(text) = raw.strip_prefix("text:") {
        return Ok(ElementQuery::Text(text.to_string()));
    }
    if let Some(role) = raw.strip_prefix("role:") {
        return Ok(ElementQuery::Role(role.to_string()));
    }
    Ok(ElementQuery::Role(raw.to_string()))
}
