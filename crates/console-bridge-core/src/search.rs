//! Regex and keyword search over store snapshots.
//!
//! Both searches are pure functions over a slice of entries in store
//! order; callers take the snapshot with [`LogStore::get_all`](crate::LogStore::get_all).

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{error::CoreError, log_entry::LogEntry};

/// Default maximum number of matches.
pub const DEFAULT_LIMIT: usize = 100;

const fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_fields() -> Vec<SearchField> {
    vec![SearchField::Message]
}

/// Entry field a pattern is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Message,
    /// Arguments serialised as JSON.
    Args,
    Stack,
}

impl SearchField {
    fn text(self, entry: &LogEntry) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            Self::Message => Some(entry.message.as_str().into()),
            Self::Args => (!entry.args.is_empty()).then(|| entry.args_text().into()),
            Self::Stack => entry.stack.as_deref().map(Into::into),
        }
    }
}

/// Parameters for [`search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_fields")]
    pub fields: Vec<SearchField>,
    /// Entries of context captured on each side of a match.
    #[serde(default)]
    pub context_lines: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl SearchParams {
    /// Case-insensitive message search with defaults.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: false,
            fields: default_fields(),
            context_lines: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// How keywords combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeywordLogic {
    #[default]
    And,
    Or,
}

/// Parameters for [`search_keywords`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordParams {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub logic: KeywordLogic,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Entries surrounding a match, in store order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchContext {
    pub before: Vec<LogEntry>,
    pub after: Vec<LogEntry>,
}

/// A matching entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub log: LogEntry,
    /// First field that matched; `None` for keyword matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<SearchField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<MatchContext>,
}

impl SearchMatch {
    /// Apply `f` to the match and every context entry.
    #[must_use]
    pub fn map_entries(self, mut f: impl FnMut(LogEntry) -> LogEntry) -> Self {
        Self {
            log: f(self.log),
            field: self.field,
            context: self.context.map(|c| MatchContext {
                before: c.before.into_iter().map(&mut f).collect(),
                after: c.after.into_iter().map(&mut f).collect(),
            }),
        }
    }
}

/// Search outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub matches: Vec<SearchMatch>,
    /// Number of matches returned.
    pub total: usize,
    /// Whether at least one further match was left out by the limit.
    pub truncated: bool,
}

impl SearchResult {
    fn new(matches: Vec<SearchMatch>, truncated: bool) -> Self {
        Self {
            total: matches.len(),
            matches,
            truncated,
        }
    }
}

fn compile(params: &SearchParams) -> Result<Regex, CoreError> {
    RegexBuilder::new(&params.pattern)
        .case_insensitive(!params.case_sensitive)
        .build()
        .map_err(|e| CoreError::invalid_pattern(&params.pattern, e))
}

/// Regex search across the selected fields.
///
/// Context entries are taken from `entries` as-is and are not themselves
/// tested against the pattern, so windows of adjacent matches may overlap.
///
/// # Errors
/// Returns `InvalidPattern` if the pattern does not compile.
pub fn search(entries: &[LogEntry], params: &SearchParams) -> Result<SearchResult, CoreError> {
    let regex = compile(params)?;
    let fields = if params.fields.is_empty() {
        default_fields()
    } else {
        params.fields.clone()
    };
    let k = params.context_lines;
    let mut matches = Vec::new();
    let mut truncated = false;

    for (idx, entry) in entries.iter().enumerate() {
        let hit = fields
            .iter()
            .copied()
            .find(|f| f.text(entry).is_some_and(|text| regex.is_match(&text)));
        let Some(field) = hit else {
            continue;
        };
        if matches.len() >= params.limit {
            truncated = true;
            break;
        }

        let context = (k > 0).then(|| MatchContext {
            before: entries[idx.saturating_sub(k)..idx].to_vec(),
            after: entries[idx + 1..idx.saturating_add(1).saturating_add(k).min(entries.len())]
                .to_vec(),
        });
        matches.push(SearchMatch {
            log: entry.clone(),
            field: Some(field),
            context,
        });
    }

    Ok(SearchResult::new(matches, truncated))
}

/// Case-insensitive keyword containment over messages.
///
/// # Errors
/// Returns `EmptyKeywords` if no keywords were supplied.
pub fn search_keywords(
    entries: &[LogEntry],
    params: &KeywordParams,
) -> Result<SearchResult, CoreError> {
    let keywords: Vec<String> = params
        .keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| k.to_lowercase())
        .collect();
    if keywords.is_empty() {
        return Err(CoreError::EmptyKeywords);
    }
    let exclude: Vec<String> = params
        .exclude
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| k.to_lowercase())
        .collect();

    let mut hits = entries.iter().filter(|entry| {
        let message = entry.message.to_lowercase();
        let included = match params.logic {
            KeywordLogic::And => keywords.iter().all(|k| message.contains(k.as_str())),
            KeywordLogic::Or => keywords.iter().any(|k| message.contains(k.as_str())),
        };
        included && !exclude.iter().any(|k| message.contains(k.as_str()))
    });
    let matches: Vec<SearchMatch> = hits
        .by_ref()
        .take(params.limit)
        .map(|entry| SearchMatch {
            log: entry.clone(),
            field: None,
            context: None,
        })
        .collect();
    let truncated = hits.next().is_some();

    Ok(SearchResult::new(matches, truncated))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::log_entry::LogLevel;

    fn entry(id: usize, message: &str) -> LogEntry {
        LogEntry {
            id: id.to_string(),
            timestamp: id as i64,
            level: LogLevel::Log,
            message: message.to_string(),
            args: Vec::new(),
            stack: None,
            tab_id: 1,
            url: String::new(),
            session_id: None,
        }
    }

    fn ids(result: &SearchResult) -> Vec<&str> {
        result.matches.iter().map(|m| m.log.id.as_str()).collect()
    }

    #[test]
    fn test_regex_search_case_handling() {
        let entries = vec![entry(0, "Fetch FAILED"), entry(1, "fetch ok"), entry(2, "failed again")];

        let result = search(&entries, &SearchParams::new("failed")).unwrap();
        assert_eq!(ids(&result), ["0", "2"]);

        let mut params = SearchParams::new("failed");
        params.case_sensitive = true;
        assert_eq!(ids(&search(&entries, &params).unwrap()), ["2"]);
    }

    #[test]
    fn test_invalid_pattern_is_input_error() {
        let err = search(&[], &SearchParams::new("([a-")).unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_context_windows_are_adjacent_and_bounded() {
        let entries: Vec<LogEntry> = (0..10)
            .map(|i| entry(i, if i == 1 || i == 3 || i == 9 { "hit" } else { "miss" }))
            .collect();
        let mut params = SearchParams::new("hit");
        params.context_lines = 2;
        let result = search(&entries, &params).unwrap();
        assert_eq!(ids(&result), ["1", "3", "9"]);

        for m in &result.matches {
            let ctx = m.context.as_ref().unwrap();
            assert!(ctx.before.len() <= 2 && ctx.after.len() <= 2);
            let pos: usize = m.log.id.parse().unwrap();
            for (offset, e) in ctx.before.iter().rev().enumerate() {
                assert_eq!(e.id, (pos - offset - 1).to_string());
            }
            for (offset, e) in ctx.after.iter().enumerate() {
                assert_eq!(e.id, (pos + offset + 1).to_string());
            }
        }

        let first = result.matches[0].context.as_ref().unwrap();
        assert_eq!(first.before.len(), 1);
        // Context includes other matches untested.
        assert_eq!(first.after[1].id, "3");
        assert!(result.matches[2].context.as_ref().unwrap().after.is_empty());
    }

    #[test]
    fn test_search_fields_and_limit() {
        let mut with_args = entry(0, "request");
        with_args.args = vec![json!({"status": 503})];
        let mut with_stack = entry(1, "crash");
        with_stack.stack = Some("at handler (app.js:503)".into());
        let entries = vec![with_args, with_stack, entry(2, "503 in message")];

        let message_only = search(&entries, &SearchParams::new("503")).unwrap();
        assert_eq!(ids(&message_only), ["2"]);

        let mut params = SearchParams::new("503");
        params.fields = vec![SearchField::Args, SearchField::Stack, SearchField::Message];
        let all = search(&entries, &params).unwrap();
        assert_eq!(ids(&all), ["0", "1", "2"]);
        assert_eq!(all.matches[0].field, Some(SearchField::Args));
        assert_eq!(all.matches[1].field, Some(SearchField::Stack));
        assert!(!all.truncated);

        params.limit = 2;
        let limited = search(&entries, &params).unwrap();
        assert_eq!(limited.total, 2);
        assert!(limited.truncated);
    }

    #[test]
    fn test_context_lines_saturate() {
        let entries = vec![entry(0, "before"), entry(1, "hit"), entry(2, "after")];
        let mut params = SearchParams::new("hit");
        params.context_lines = usize::MAX;
        let result = search(&entries, &params).unwrap();
        let ctx = result.matches[0].context.as_ref().unwrap();
        assert_eq!(ctx.before.len(), 1);
        assert_eq!(ctx.after.len(), 1);

        let params: SearchParams =
            serde_json::from_str(r#"{"pattern": "after", "contextLines": 18446744073709551615}"#)
                .unwrap();
        let result = search(&entries, &params).unwrap();
        assert_eq!(ids(&result), ["2"]);
        assert!(result.matches[0].context.as_ref().unwrap().after.is_empty());
    }

    #[test]
    fn test_truncated_only_when_matches_dropped() {
        let entries = vec![entry(0, "hit"), entry(1, "hit"), entry(2, "miss")];
        let mut params = SearchParams::new("hit");

        params.limit = 2;
        let exact = search(&entries, &params).unwrap();
        assert_eq!(exact.total, 2);
        assert!(!exact.truncated);

        params.limit = 1;
        assert!(search(&entries, &params).unwrap().truncated);

        params.limit = 0;
        let none = search(&entries, &params).unwrap();
        assert_eq!(none.total, 0);
        assert!(none.truncated);

        let mut kw = keywords(&["hit"], KeywordLogic::And, &[]);
        kw.limit = 2;
        assert!(!search_keywords(&entries, &kw).unwrap().truncated);
        kw.limit = 1;
        assert!(search_keywords(&entries, &kw).unwrap().truncated);
    }

    fn keywords(words: &[&str], logic: KeywordLogic, exclude: &[&str]) -> KeywordParams {
        KeywordParams {
            keywords: words.iter().map(ToString::to_string).collect(),
            logic,
            exclude: exclude.iter().map(ToString::to_string).collect(),
            limit: DEFAULT_LIMIT,
        }
    }

    #[test]
    fn test_keyword_logic_and_exclusion() {
        let entries = vec![
            entry(0, "alpha beta"),
            entry(1, "Alpha only"),
            entry(2, "BETA only"),
            entry(3, "neither"),
        ];

        let and = search_keywords(&entries, &keywords(&["a", "b"], KeywordLogic::And, &[])).unwrap();
        assert!(and.matches.iter().all(|m| {
            let msg = m.log.message.to_lowercase();
            msg.contains('a') && msg.contains('b')
        }));
        assert_eq!(ids(&and), ["0", "2"]);

        let both = search_keywords(&entries, &keywords(&["alpha", "beta"], KeywordLogic::And, &[]))
            .unwrap();
        assert_eq!(ids(&both), ["0"]);

        let either = search_keywords(&entries, &keywords(&["alpha", "beta"], KeywordLogic::Or, &[]))
            .unwrap();
        assert_eq!(ids(&either), ["0", "1", "2"]);

        let excluded = search_keywords(
            &entries,
            &keywords(&["alpha", "beta"], KeywordLogic::Or, &["alpha"]),
        )
        .unwrap();
        assert_eq!(ids(&excluded), ["2"]);
    }

    #[test]
    fn test_keyword_requires_keywords() {
        let err = search_keywords(&[], &keywords(&[], KeywordLogic::And, &[])).unwrap_err();
        assert!(matches!(err, CoreError::EmptyKeywords));
    }

    #[test]
    fn test_keyword_params_defaults() {
        let params: KeywordParams = serde_json::from_str(r#"{"keywords": ["x"]}"#).unwrap();
        assert_eq!(params.logic, KeywordLogic::And);
        assert_eq!(params.limit, DEFAULT_LIMIT);
        let params: KeywordParams =
            serde_json::from_str(r#"{"keywords": ["x"], "logic": "OR"}"#).unwrap();
        assert_eq!(params.logic, KeywordLogic::Or);
    }
}
