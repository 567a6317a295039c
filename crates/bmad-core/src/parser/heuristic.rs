//! Final-block parser for heuristic triage replies.
//!
//! The model may write any preamble; only the text from the LAST
//! `risk_score:` line onward is parsed.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::kv::{dedup_by_key, nested_block, parse_bool, quote, split_kv, split_kv_unquoted};
use crate::error::{Error, Result};

pub const ANCHOR: &str = "risk_score:";

pub const REQUIRED_ITEMS: [&str; 6] = [
    "tools_present",
    "pr_detected",
    "conversations_fetched",
    "auto_resolved_outdated",
    "relevance_classified",
    "human_approval_needed",
];

static ANCHOR_RE: OnceLock<Regex> = OnceLock::new();

fn anchor_re() -> &'static Regex {
    ANCHOR_RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*risk_score[ \t]*:[ \t]*([0-9]+)\b").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicItems {
    pub tools_present: bool,
    pub pr_detected: bool,
    pub conversations_fetched: bool,
    pub auto_resolved_outdated: bool,
    pub relevance_classified: bool,
    pub human_approval_needed: bool,
}

impl HeuristicItems {
    fn from_map(map: &BTreeMap<String, bool>) -> Result<Self> {
        let get = |key: &str| {
            map.get(key)
                .copied()
                .ok_or_else(|| Error::parse(format!("missing items.{key}")))
        };
        Ok(Self {
            tools_present: get("tools_present")?,
            pr_detected: get("pr_detected")?,
            conversations_fetched: get("conversations_fetched")?,
            auto_resolved_outdated: get("auto_resolved_outdated")?,
            relevance_classified: get("relevance_classified")?,
            human_approval_needed: get("human_approval_needed")?,
        })
    }

    fn values(&self) -> [bool; 6] {
        [
            self.tools_present,
            self.pr_detected,
            self.conversations_fetched,
            self.auto_resolved_outdated,
            self.relevance_classified,
            self.human_approval_needed,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicResult {
    pub score: u8,
    pub summary: String,
    pub proposed_actions: Vec<String>,
    pub items: HeuristicItems,
    #[serde(default)]
    pub alternatives: Vec<BTreeMap<String, String>>,
}

impl HeuristicResult {
    /// Parse a full model reply.
    pub fn parse(text: &str) -> Result<Self> {
        let start = anchor_re()
            .find_iter(text)
            .last()
            .map(|m| m.start())
            .ok_or_else(|| Error::parse("risk_score not found"))?;
        let block = &text[start..];

        let score = parse_score(block)?;
        let summary = first_scalar(block, "summary")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::parse("missing summary"))?;
        let proposed_actions = block
            .lines()
            .filter_map(|l| {
                let l = l.trim();
                l.starts_with("preferred_option:").then(|| split_kv_unquoted(l)).flatten()
            })
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>();
        if proposed_actions.is_empty() {
            return Err(Error::parse("preferred_option not found"));
        }
        let items = parse_items(block)?;
        let alternatives = parse_alternatives(block);

        Ok(Self {
            score,
            summary,
            proposed_actions,
            items,
            alternatives,
        })
    }

    /// Render the canonical final block this parser accepts.
    pub fn to_canonical(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "risk_score: {}", self.score);
        let _ = writeln!(out, "summary: {}", quote(&self.summary));
        for action in &self.proposed_actions {
            let _ = writeln!(out, "preferred_option: {}", quote(action));
        }
        out.push_str("items:\n");
        for (key, value) in REQUIRED_ITEMS.iter().zip(self.items.values()) {
            let _ = writeln!(out, "  {key}: {value}");
        }
        if !self.alternatives.is_empty() {
            out.push_str("alternatives:\n");
            for alt in &self.alternatives {
                let mut prefix = "  - ";
                let ordered = alt
                    .get_key_value("option")
                    .into_iter()
                    .chain(alt.iter().filter(|(k, _)| k.as_str() != "option"));
                for (key, value) in ordered {
                    let _ = writeln!(out, "{prefix}{key}: {}", quote(value));
                    prefix = "    ";
                }
            }
        }
        out
    }

    /// Invariants every accepted result satisfies.
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.score) {
            return Err(Error::validation(
                "heuristic score range",
                "risk_score",
                format!("{} is outside 1..=10", self.score),
            ));
        }
        if self.summary.trim().is_empty() {
            return Err(Error::validation("heuristic summary", "summary", "empty"));
        }
        if self.proposed_actions.is_empty() {
            return Err(Error::validation(
                "heuristic proposed actions",
                "preferred_option",
                "no action proposed",
            ));
        }
        Ok(())
    }
}

fn parse_score(block: &str) -> Result<u8> {
    let caps = anchor_re()
        .captures(block)
        .ok_or_else(|| Error::parse("risk_score not found"))?;
    let raw = &caps[1];
    let score: u32 = raw
        .parse()
        .map_err(|_| Error::parse(format!("invalid risk_score: {raw}")))?;
    if !(1..=10).contains(&score) {
        return Err(Error::parse(format!("invalid risk_score: {score}")));
    }
    Ok(score as u8)
}

fn first_scalar(block: &str, key: &str) -> Option<String> {
    let prefix = format!("{key}:");
    block
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(&prefix))
        .and_then(split_kv_unquoted)
        .map(|(_, v)| v)
}

fn parse_items(block: &str) -> Result<HeuristicItems> {
    let lines = nested_block(block, "items:").unwrap_or_default();
    let mut map = BTreeMap::new();
    for line in lines {
        if let Some((key, value)) = split_kv(line) {
            let value = parse_bool(&format!("items[{key}]"), value)?;
            map.insert(key.to_string(), value);
        }
    }
    if map.is_empty() {
        return Err(Error::parse("items block not found or empty"));
    }
    HeuristicItems::from_map(&map)
}

fn parse_alternatives(block: &str) -> Vec<BTreeMap<String, String>> {
    let mut lines = block.lines().map(|l| l.trim_end_matches('\r'));
    if lines
        .by_ref()
        .find(|l| l.trim().starts_with("alternatives:"))
        .is_none()
    {
        return Vec::new();
    }

    let mut alts = Vec::new();
    let mut current: BTreeMap<String, String> = BTreeMap::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || !(line.starts_with("  ") || line.starts_with('\t')) {
            break;
        }
        let entry = match trimmed.strip_prefix("- ") {
            Some(rest) => {
                if !current.is_empty() {
                    alts.push(std::mem::take(&mut current));
                }
                rest.trim()
            }
            None => trimmed,
        };
        if let Some((key, value)) = split_kv_unquoted(entry) {
            current.insert(key.to_string(), value);
        }
    }
    if !current.is_empty() {
        alts.push(current);
    }
    dedup_by_key(alts, "option")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    const ITEMS: &str = "items:\n  tools_present: true\n  pr_detected: true\n  \
conversations_fetched: true\n  auto_resolved_outdated: false\n  \
relevance_classified: true\n  human_approval_needed: false\n";

    fn payload(score: u32) -> String {
        format!("risk_score: {score}\nsummary: \"ok\"\npreferred_option: \"rebase\"\n{ITEMS}")
    }

    #[test]
    fn parses_minimal_block() {
        let result = HeuristicResult::parse(&payload(7)).unwrap();
        assert_eq!(result.score, 7);
        assert_eq!(result.summary, "ok");
        assert_eq!(result.proposed_actions, vec!["rebase".to_string()]);
        assert_eq!(
            result.items,
            HeuristicItems {
                tools_present: true,
                pr_detected: true,
                conversations_fetched: true,
                auto_resolved_outdated: false,
                relevance_classified: true,
                human_approval_needed: false,
            }
        );
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn canonical_form_round_trips() {
        let input = payload(7);
        let result = HeuristicResult::parse(&input).unwrap();
        assert_eq!(result.to_canonical(), input);
    }

    #[test]
    fn multi_line_values_survive_canonical_form() {
        let mut result = HeuristicResult::parse(&payload(6)).unwrap();
        result.summary = "Rename the handler.\nNote: callers in api/ need \"updating\"".into();
        result.proposed_actions = vec!["split: then merge".into()];
        result.alternatives = vec![BTreeMap::from([
            ("option".to_string(), "leave as is".to_string()),
            ("reason".to_string(), "low value\nand risky".to_string()),
        ])];
        let canonical = result.to_canonical();
        assert_eq!(HeuristicResult::parse(&canonical).unwrap(), result);
        assert_eq!(HeuristicResult::parse(&canonical).unwrap().to_canonical(), canonical);
    }

    #[test]
    fn last_anchor_wins() {
        let text = format!(
            "Thinking out loud...\n{}\nOn reflection:\n{}",
            payload(3),
            payload(9)
        );
        assert_eq!(HeuristicResult::parse(&text).unwrap().score, 9);
    }

    #[test]
    fn tolerates_preamble() {
        let text = format!("I looked at the diff.\nsummary: not this one\n\n{}", payload(2));
        let result = HeuristicResult::parse(&text).unwrap();
        assert_eq!(result.summary, "ok");
    }

    #[test]
    fn out_of_range_score_is_fatal() {
        let err = HeuristicResult::parse(&payload(11)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(HeuristicResult::parse(&payload(0)).is_err());
    }

    #[test]
    fn missing_anchor_is_fatal() {
        let err = HeuristicResult::parse("summary: ok\n").unwrap_err();
        assert!(err.to_string().contains("risk_score"));
    }

    #[test]
    fn non_boolean_item_names_key() {
        let text = payload(4).replace("pr_detected: true", "pr_detected: yes");
        let err = HeuristicResult::parse(&text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("pr_detected"));
    }

    #[test]
    fn mixed_case_booleans_accepted() {
        let text = payload(4).replace("tools_present: true", "tools_present: TRUE");
        assert!(HeuristicResult::parse(&text).unwrap().items.tools_present);
    }

    #[test]
    fn missing_item_is_fatal() {
        let text = payload(4).replace("  human_approval_needed: false\n", "");
        let err = HeuristicResult::parse(&text).unwrap_err();
        assert!(err.to_string().contains("human_approval_needed"));
    }

    #[test]
    fn items_block_stops_at_unindented_line() {
        let text = payload(5).replace(
            "  relevance_classified: true\n",
            "note: early end\n  relevance_classified: true\n",
        );
        let err = HeuristicResult::parse(&text).unwrap_err();
        assert!(err.to_string().contains("relevance_classified"));
    }

    #[test]
    fn alternatives_are_deduplicated_by_option() {
        let text = format!(
            "{}alternatives:\n  - option: \"squash\"\n    reason: tidy\n  - option: squash\n    \
reason: dup\n  - option: \"merge\"\n",
            payload(6)
        );
        let result = HeuristicResult::parse(&text).unwrap();
        assert_eq!(result.alternatives.len(), 2);
        assert_eq!(result.alternatives[0]["reason"], "tidy");
        assert_eq!(result.alternatives[1]["option"], "merge");
        assert_eq!(HeuristicResult::parse(&result.to_canonical()).unwrap(), result);
    }

    #[test]
    fn several_preferred_options_collected() {
        let text = payload(3).replace(
            "preferred_option: \"rebase\"\n",
            "preferred_option: \"rebase\"\npreferred_option: 'squash'\n",
        );
        let result = HeuristicResult::parse(&text).unwrap();
        assert_eq!(result.proposed_actions, vec!["rebase", "squash"]);
    }
}
