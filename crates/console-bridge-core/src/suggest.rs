//! Relevance ranking of connected tabs against a project context.

use std::{fs, path::Path, sync::OnceLock};

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use url::Url;

use crate::{
    context::SuggestionContext,
    log_entry::{LogEntry, TabId, TabInfo, now_millis},
};

const URL_PATTERN_WEIGHT: f64 = 30.0;
const PORT_WEIGHT: f64 = 40.0;
const DOMAIN_WEIGHT: f64 = 25.0;
const PROJECT_NAME_WEIGHT: f64 = 15.0;
const RECENCY_WEIGHT: f64 = 20.0;

/// Shortest project name considered meaningful.
const MIN_PROJECT_NAME_LEN: usize = 3;

/// A scored tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSuggestion {
    pub tab: TabInfo,
    pub score: f64,
    pub reasons: Vec<String>,
    pub log_count: usize,
    /// Timestamp of the newest log for this tab.
    pub last_activity: Option<i64>,
}

impl TabSuggestion {
    fn activity(&self) -> i64 {
        self.last_activity.unwrap_or(self.tab.last_seen)
    }
}

/// Rank `tabs` by relevance to `ctx`, best first.
///
/// `log_accessor` returns the stored entries of one tab. Every tab is
/// returned; with an empty context only recency contributes.
pub fn suggest_tabs<F>(tabs: &[TabInfo], log_accessor: F, ctx: &SuggestionContext) -> Vec<TabSuggestion>
where
    F: Fn(TabId) -> Vec<LogEntry>,
{
    suggest_tabs_at(tabs, log_accessor, ctx, now_millis())
}

/// [`suggest_tabs`] against an explicit clock.
pub fn suggest_tabs_at<F>(
    tabs: &[TabInfo],
    log_accessor: F,
    ctx: &SuggestionContext,
    now: i64,
) -> Vec<TabSuggestion>
where
    F: Fn(TabId) -> Vec<LogEntry>,
{
    let patterns: Vec<UrlPattern> = ctx.url_patterns.iter().map(|p| UrlPattern::new(p)).collect();
    let project = ctx
        .project_name()
        .filter(|name| name.chars().count() >= MIN_PROJECT_NAME_LEN);

    let mut suggestions: Vec<TabSuggestion> = tabs
        .iter()
        .map(|tab| {
            let logs = log_accessor(tab.id);
            let last_activity = logs.iter().map(|l| l.timestamp).max();
            let mut score = 0.0;
            let mut reasons = Vec::new();

            let url_lower = tab.url.to_lowercase();
            for pattern in &patterns {
                if pattern.matches(&tab.url, &url_lower) {
                    score += URL_PATTERN_WEIGHT;
                    reasons.push(format!("URL matches pattern \"{}\"", pattern.raw));
                }
            }

            let parsed = Url::parse(&tab.url).ok();
            if let Some(port) = parsed.as_ref().and_then(Url::port) {
                if ctx.ports.contains(&port) {
                    score += PORT_WEIGHT;
                    reasons.push(format!("Port {port} matches"));
                }
            }
            if let Some(host) = parsed.as_ref().and_then(Url::host_str) {
                if let Some(domain) = ctx.domains.iter().find(|d| domain_matches(host, d)) {
                    score += DOMAIN_WEIGHT;
                    reasons.push(format!("Domain {domain} matches"));
                }
            }

            if let Some(age) = last_activity.map(|ts| now.saturating_sub(ts).max(0)) {
                #[allow(clippy::cast_precision_loss)]
                let minutes = age as f64 / 60_000.0;
                score += RECENCY_WEIGHT / (1.0 + minutes);
                reasons.push(format!("Recent activity ({} ago)", format_age(age)));
            }

            if let Some(ref name) = project {
                let in_url = url_lower.contains(name.as_str());
                if in_url || tab.title.to_lowercase().contains(name.as_str()) {
                    score += PROJECT_NAME_WEIGHT;
                    let place = if in_url { "URL" } else { "title" };
                    reasons.push(format!("Project name \"{name}\" found in {place}"));
                }
            }

            TabSuggestion {
                tab: tab.clone(),
                score,
                reasons,
                log_count: logs.len(),
                last_activity,
            }
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.activity().cmp(&a.activity()))
            .then_with(|| a.tab.id.cmp(&b.tab.id))
    });
    suggestions
}

struct UrlPattern {
    raw: String,
    regex: Option<Regex>,
    lower: String,
}

impl UrlPattern {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            regex: RegexBuilder::new(raw).case_insensitive(true).build().ok(),
            lower: raw.to_lowercase(),
        }
    }

    fn matches(&self, url: &str, url_lower: &str) -> bool {
        self.regex.as_ref().map_or_else(
            || url_lower.contains(self.lower.as_str()),
            |re| re.is_match(url),
        )
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches('.');
    host.eq_ignore_ascii_case(domain)
        || host
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
}

fn format_age(ms: i64) -> String {
    match ms {
        ms if ms < 60_000 => format!("{}s", ms / 1000),
        ms if ms < 3_600_000 => format!("{}m", ms / 60_000),
        ms if ms < 86_400_000 => format!("{}h", ms / 3_600_000),
        ms => format!("{}d", ms / 86_400_000),
    }
}

/// Dependency and script markers of common dev servers, with their default ports.
const FRAMEWORK_PORTS: &[(&str, u16)] = &[
    ("vite", 5173),
    ("@sveltejs/kit", 5173),
    ("next", 3000),
    ("nuxt", 3000),
    ("@remix-run/dev", 3000),
    ("react-scripts", 3000),
    ("@angular/cli", 4200),
    ("@vue/cli-service", 8080),
    ("astro", 4321),
    ("gatsby", 8000),
    ("webpack-dev-server", 8080),
];

fn explicit_port_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:--port[= ]|-p\s+|PORT=)(\d{2,5})\b").expect("port regex is valid")
    })
}

/// Guess likely dev-server ports from project markers in `cwd`.
///
/// Returns an empty list when nothing recognisable is found.
#[must_use]
pub fn detect_common_ports(cwd: &Path) -> Vec<u16> {
    let mut ports = Vec::new();
    let mut push = |port: u16| {
        if !ports.contains(&port) {
            ports.push(port);
        }
    };

    if let Some(pkg) = read_package_json(cwd) {
        let scripts: Vec<&str> = pkg
            .get("scripts")
            .and_then(serde_json::Value::as_object)
            .map(|s| s.values().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default();

        for script in &scripts {
            for caps in explicit_port_re().captures_iter(script) {
                if let Ok(port) = caps[1].parse::<u16>() {
                    push(port);
                }
            }
        }

        let has_dep = |name: &str| {
            ["dependencies", "devDependencies"]
                .iter()
                .any(|section| pkg.get(section).and_then(|d| d.get(name)).is_some())
        };
        for &(marker, port) in FRAMEWORK_PORTS {
            if has_dep(marker) {
                push(port);
            }
        }
        if scripts.iter().any(|s| s.contains("ng serve")) {
            push(4200);
        }
    }

    let exists = |name: &str| cwd.join(name).is_file();
    if ["vite.config.js", "vite.config.ts", "vite.config.mjs", "vite.config.mts"]
        .iter()
        .any(|&f| exists(f))
    {
        push(5173);
    }
    if exists("angular.json") {
        push(4200);
    }
    if exists("manage.py") {
        push(8000);
    }
    if fs::read_to_string(cwd.join("Gemfile")).is_ok_and(|g| g.contains("rails")) {
        push(3000);
    }
    if exists("app.py") {
        push(5000);
    }
    if exists("Trunk.toml") {
        push(8080);
    }

    ports
}

fn read_package_json(cwd: &Path) -> Option<serde_json::Value> {
    let raw = fs::read_to_string(cwd.join("package.json")).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(path = %cwd.display(), "Ignoring unreadable package.json: {e}");
            None
        }
    }
}
