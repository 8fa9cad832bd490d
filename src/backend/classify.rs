//! Rate-limit detection on raw backend output.
//!
//! Backends report throttling in free text. This is the only place that knows
//! those phrases; the executor only sees `RunOutcome::RateLimited`.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Phrases that mark a throttled response (matched case-insensitively).
pub const DEFAULT_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "please wait",
    "retry after",
    "api rate limit",
    "quota exceeded",
    "throttled",
];

/// Cooldown used when output is throttled but names no duration.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Result of inspecting one backend output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub rate_limited: bool,
    /// Cooldown to apply; None when not rate limited
    pub retry_after: Option<Duration>,
}

/// Detects throttling phrases and extracts the advertised wait.
#[derive(Debug, Clone)]
pub struct RateLimitClassifier {
    patterns: Vec<String>,
    default_retry_after: Duration,
}

impl Default for RateLimitClassifier {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl RateLimitClassifier {
    /// Classifier with the default phrase list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extra phrase.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into().to_lowercase());
        self
    }

    /// Change the fallback cooldown.
    pub fn with_default_retry_after(mut self, retry_after: Duration) -> Self {
        self.default_retry_after = retry_after;
        self
    }

    /// Inspect `output` once.
    pub fn classify(&self, output: &str) -> Classification {
        if self.is_rate_limited(output) {
            Classification {
                rate_limited: true,
                retry_after: Some(self.parse_retry_after(output)),
            }
        } else {
            Classification {
                rate_limited: false,
                retry_after: None,
            }
        }
    }

    /// Check the output for any throttling phrase.
    pub fn is_rate_limited(&self, output: &str) -> bool {
        let lower = output.to_lowercase();
        self.patterns.iter().any(|p| lower.contains(p.as_str()))
    }

    /// Advertised wait in the output, else the fallback.
    ///
    /// A "<n> seconds|minutes|hours" phrase after the first throttling phrase
    /// wins over one earlier in the output.
    pub fn parse_retry_after(&self, output: &str) -> Duration {
        let lower = output.to_lowercase();
        let anchor = self.patterns.iter().filter_map(|p| lower.find(p.as_str())).min();
        parse_duration_phrase(&lower, anchor).unwrap_or(self.default_retry_after)
    }
}

fn duration_regex() -> &'static Regex {
    static DURATION_REGEX: OnceLock<Regex> = OnceLock::new();
    DURATION_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h)\b")
            .expect("duration pattern is a valid regex")
    })
}

fn parse_duration_phrase(text: &str, anchor: Option<usize>) -> Option<Duration> {
    let found: Vec<(usize, Duration)> = duration_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            // Tail of a dotted number such as a version string
            if text[..whole.start()].ends_with('.') {
                return None;
            }
            Some((whole.start(), to_duration(caps.get(1)?.as_str(), caps.get(2)?.as_str())?))
        })
        .collect();

    anchor
        .and_then(|pos| found.iter().find(|(start, _)| *start >= pos))
        .or_else(|| found.first())
        .map(|(_, duration)| *duration)
}

fn to_duration(amount: &str, unit: &str) -> Option<Duration> {
    let amount: f64 = amount.parse().ok()?;
    let scale = match unit.chars().next()?.to_ascii_lowercase() {
        's' => 1.0,
        'm' => 60.0,
        'h' => 3600.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(amount * scale).ok()
}
