//! Grammar of a model reply:
//!
//! ```text
//! reply     := ... [ "<thinking>" rationale "</thinking>" ] ... [ "<summary>" summary "</summary>" ] ...
//! tag_reply := ... "<tags>" json-string-array "</tags>" ...
//! ```
//!
//! Each region is optional. The first occurrence wins and its body is trimmed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::EXTRACTION_FAILED;

fn region_pattern(tag: &str) -> Regex {
    Regex::new(&format!(r"<{0}>([\s\S]*?)</{0}>", tag)).expect("valid region pattern")
}

static THINKING: Lazy<Regex> = Lazy::new(|| region_pattern("thinking"));
static SUMMARY: Lazy<Regex> = Lazy::new(|| region_pattern("summary"));
static TAGS: Lazy<Regex> = Lazy::new(|| region_pattern("tags"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    Present(String),
    Missing,
}

impl Region {
    pub fn or_sentinel(self) -> String {
        match self {
            Region::Present(body) => body,
            Region::Missing => EXTRACTION_FAILED.to_string(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Region::Missing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub rationale: Region,
    pub summary: Region,
}

pub fn parse_reply(text: &str) -> ParsedReply {
    ParsedReply {
        rationale: extract_region(text, &THINKING),
        summary: extract_region(text, &SUMMARY),
    }
}

/// Body of the first match of a region pattern; blank bodies count as missing.
fn extract_region(text: &str, region: &Regex) -> Region {
    region
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .filter(|body| !body.is_empty())
        .map(|body| Region::Present(body.to_string()))
        .unwrap_or(Region::Missing)
}

/// Tags from a `<tags>` region holding a JSON array. Falls back to a comma or
/// line separated list; anything else gives no tags.
pub fn parse_tags(text: &str) -> Vec<String> {
    let Region::Present(body) = extract_region(text, &TAGS) else {
        return Vec::new();
    };

    let raw: Vec<String> = match serde_json::from_str::<Vec<String>>(&body) {
        Ok(list) => list,
        Err(_) => body
            .split([',', '\n'])
            .map(|t| t.trim().trim_start_matches("- ").trim_matches('"').to_string())
            .collect(),
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in raw.into_iter().map(|t| t.trim().to_string()) {
        if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_both_regions() {
        let reply = "<output><thinking>\n- New API\n- Good for ops\n</thinking>\
                     <summary> X now supports Y. </summary></output>";
        let parsed = parse_reply(reply);
        assert_eq!(
            parsed.rationale,
            Region::Present("- New API\n- Good for ops".to_string())
        );
        assert_eq!(parsed.summary, Region::Present("X now supports Y.".to_string()));
    }

    #[test]
    fn missing_summary_degrades_to_sentinel() {
        let parsed = parse_reply("<output><thinking>- only bullets</thinking></output>");
        assert!(parsed.summary.is_missing());
        assert_eq!(parsed.summary.or_sentinel(), "extraction failed");
        assert_eq!(parsed.rationale.or_sentinel(), "- only bullets");
    }

    #[test]
    fn first_match_wins_and_unclosed_region_is_missing() {
        let parsed = parse_reply("<summary>one</summary><summary>two</summary><thinking>open");
        assert_eq!(parsed.summary, Region::Present("one".to_string()));
        assert!(parsed.rationale.is_missing());
    }

    #[test]
    fn blank_region_counts_as_missing() {
        assert!(extract_region("<summary>  \n </summary>", &SUMMARY).is_missing());
    }

    #[test]
    fn tags_from_json_array_are_deduplicated() {
        let tags = parse_tags(r#"<tags>["Lambda", "S3", "lambda", ""]</tags>"#);
        assert_eq!(tags, vec!["Lambda".to_string(), "S3".to_string()]);
    }

    #[test]
    fn tags_fall_back_to_plain_list() {
        let tags = parse_tags("<tags>\n- Rust\n- WebAssembly\n</tags>");
        assert_eq!(tags, vec!["Rust".to_string(), "WebAssembly".to_string()]);
        assert!(parse_tags("no tags at all").is_empty());
    }
}
