//! Recommendation formatter
//!
//! Renders diagnosis annotations and strategy lists as user-facing log lines,
//! suppressing repeats of the same recommendation for the same host.

use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::Entry;
use tracing::debug;

use crate::config::FormatterConfig;
use crate::store::KeyedStore;
use crate::types::{
    ASSIST_ALLOW_NO_SNI, ASSIST_DROP_UDP_443, CONFIDENCE_MARKER, INTEL_MARKER, PLAN_PREFIX,
    STRATEGY_NONE, STRATEGY_UNKNOWN, StrategyId,
};

/// Prefix of every line produced here.
pub const INTEL_LOG_PREFIX: &str = "[INTEL]";

#[derive(Debug, Clone)]
struct EmitRecord {
    last_emit: DateTime<Utc>,
    signature: String,
}

/// Formats diagnosis suffixes and deduplicated recommendation lines.
#[derive(Debug, Default)]
pub struct RecommendationFormatter {
    emitted: KeyedStore<String, EmitRecord>,
    config: FormatterConfig,
}

impl RecommendationFormatter {
    pub fn new(config: FormatterConfig) -> Self {
        Self {
            emitted: KeyedStore::new(),
            config,
        }
    }

    /// Render `(intel:<Id> conf=<N>; <note>; ...)` as
    /// `([INTEL] diagnosis=<Id> confidence=<N>%: <note>)`.
    ///
    /// Returns `None` for blank input or input without the `intel:` marker.
    pub fn format_diagnosis_suffix(&self, text: &str) -> Option<String> {
        let tail = text.trim();
        if tail.is_empty() {
            return None;
        }

        let inner = tail
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .unwrap_or(tail);

        let marker = find_ignore_ascii_case(inner, INTEL_MARKER)?;
        let after = inner[marker + INTEL_MARKER.len()..].trim_start();
        let diagnosis: &str = after
            .split(|c: char| c.is_whitespace() || c == ';' || c == ')')
            .next()
            .unwrap_or_default();
        if diagnosis.is_empty() {
            return None;
        }

        let confidence = parse_confidence(inner);
        let note = first_note(inner).map(|n| compact(n, self.config.max_note_chars));

        Some(match note {
            Some(note) if !note.is_empty() => format!(
                "({} diagnosis={} confidence={}%: {})",
                INTEL_LOG_PREFIX, diagnosis, confidence, note
            ),
            _ => format!(
                "({} diagnosis={} confidence={}%)",
                INTEL_LOG_PREFIX, diagnosis, confidence
            ),
        })
    }

    /// Build `[INTEL] Recommendation: t1, t2 | <context>` for `host_key`.
    ///
    /// Returns `None` when no strategy tokens remain, or when the same token
    /// set was already emitted for this host within the cooldown.
    pub fn build_recommendation_line(
        &self,
        host_key: &str,
        strategies: &str,
        context: Option<&str>,
    ) -> Option<String> {
        self.build_recommendation_line_at(host_key, strategies, context, Utc::now())
    }

    /// [`Self::build_recommendation_line`] with an explicit clock.
    pub fn build_recommendation_line_at(
        &self,
        host_key: &str,
        strategies: &str,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let tokens = extract_strategy_tokens(strategies);
        if tokens.is_empty() {
            return None;
        }

        let signature = tokens.join(",");
        if !self.should_emit(host_key, &signature, now) {
            debug!(host = host_key, signature = %signature, "Suppressed repeated recommendation");
            return None;
        }

        let mut line = format!("{} Recommendation: {}", INTEL_LOG_PREFIX, tokens.join(", "));
        if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
            line.push_str(" | ");
            line.push_str(context);
        }
        Some(line)
    }

    /// Drop the dedup state for one host.
    pub fn forget(&self, host_key: &str) -> bool {
        self.emitted.remove(&normalize_host(host_key)).is_some()
    }

    /// Number of hosts with dedup state.
    pub fn tracked_hosts(&self) -> usize {
        self.emitted.len()
    }

    fn should_emit(&self, host_key: &str, signature: &str, now: DateTime<Utc>) -> bool {
        let cooldown = i64::try_from(self.config.dedup_cooldown_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let record = EmitRecord {
            last_emit: now,
            signature: signature.to_string(),
        };

        self.emitted
            .with_entry(normalize_host(host_key), |entry| match entry {
                Entry::Occupied(mut previous) => {
                    let prev = previous.get();
                    if prev.signature == signature
                        && now.signed_duration_since(prev.last_emit) < cooldown
                    {
                        return false;
                    }
                    previous.insert(record);
                    true
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    true
                }
            })
    }
}

fn normalize_host(host_key: &str) -> String {
    host_key.trim().to_lowercase()
}

/// Byte offset of `needle` in `haystack`, ignoring ASCII case.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
}

fn parse_confidence(inner: &str) -> i64 {
    let Some(idx) = find_ignore_ascii_case(inner, CONFIDENCE_MARKER) else {
        return 0;
    };
    let digits: String = inner[idx + CONFIDENCE_MARKER.len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().map(|v| v.clamp(0, 100)).unwrap_or(0)
}

/// Text between the first and second `;`, trimmed.
fn first_note(inner: &str) -> Option<&str> {
    let (_, rest) = inner.split_once(';')?;
    let note = rest.split(';').next().unwrap_or_default().trim();
    (!note.is_empty()).then_some(note)
}

/// Collapse whitespace (newlines included) and cap at `max_chars` characters,
/// marking truncation with an ellipsis.
pub fn compact(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let head: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", head.trim_end())
}

/// Split a strategy list into legacy tokens.
///
/// Accepts `plan:A + B (conf=N)` as well as bare `A, B; C`. Returns an empty
/// list for the `NONE` / `UNKNOWN` sentinels.
pub fn extract_strategy_tokens(raw: &str) -> Vec<String> {
    let mut raw = raw.trim();
    if raw.is_empty()
        || raw.eq_ignore_ascii_case(STRATEGY_NONE)
        || raw.eq_ignore_ascii_case(STRATEGY_UNKNOWN)
    {
        return Vec::new();
    }

    if raw.len() >= PLAN_PREFIX.len()
        && raw.is_char_boundary(PLAN_PREFIX.len())
        && raw[..PLAN_PREFIX.len()].eq_ignore_ascii_case(PLAN_PREFIX)
    {
        raw = &raw[PLAN_PREFIX.len()..];
    }
    if let Some(paren) = raw.find('(').filter(|&i| i > 0) {
        raw = raw[..paren].trim();
    }

    let mut tokens: Vec<String> = Vec::new();
    for token in raw.split([',', '+', ';']).map(str::trim).filter(|t| !t.is_empty()) {
        let mapped = legacy_token(token);
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(&mapped)) {
            tokens.push(mapped);
        }
    }
    tokens
}

/// Map a strategy or assist name to its legacy token.
pub fn legacy_token(token: &str) -> String {
    if token.eq_ignore_ascii_case(ASSIST_DROP_UDP_443) || token.eq_ignore_ascii_case("QUIC_TO_TCP") {
        return "DROP_UDP_443".to_string();
    }
    if token.eq_ignore_ascii_case(ASSIST_ALLOW_NO_SNI) || token.eq_ignore_ascii_case("NO_SNI") {
        return "ALLOW_NO_SNI".to_string();
    }
    match StrategyId::ALL
        .into_iter()
        .find(|id| id.as_str().eq_ignore_ascii_case(token))
    {
        Some(id) => id.legacy_token().to_string(),
        None => token.to_uppercase(),
    }
}
