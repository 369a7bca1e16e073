use crate::config::MAX_SLUG_LEN;
use crate::models::Series;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static NON_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());

static DASH_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

/// "Name #3.5" / "Name, 2" with an optional position suffix
static SERIES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)(?:\s*[#,]\s*(\d+(?:\.\d+)?))?$").unwrap());

static BARE_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{3,4}$").unwrap());

static EMBEDDED_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());

static MARKDOWN_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());

static REFERENCE_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\[\d+\]").unwrap());

static LINK_DEFINITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\[\d+\]:\s*\S+.*$").unwrap());

static LINE_BREAK_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>").unwrap());

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());

static SPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

static BLANK_LINE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Derives a URL-safe slug: NFKD fold to ASCII, lowercase, non-word characters
/// removed, whitespace runs collapsed to single dashes, capped at 200 chars.
pub fn slugify(text: &str) -> String {
    let ascii: String = text.nfkd().filter(|c| c.is_ascii()).collect();
    let lower = ascii.to_lowercase();
    let cleaned = NON_SLUG_RE.replace_all(&lower, "");
    let dashed = DASH_RUN_RE.replace_all(&cleaned, "-");
    dashed.trim_matches('-').chars().take(MAX_SLUG_LEN).collect()
}

/// Truncates to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parses the free-text date strings found in author records ("1984-07-01",
/// "July 1, 1984", "1984", "c. 1984"). Bare years resolve to January 1st.
pub fn parse_free_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    // "July 1984" has no day component
    if let Ok(date) = NaiveDate::parse_from_str(&format!("1 {trimmed}"), "%d %B %Y") {
        return Some(date);
    }

    let year: i32 = if BARE_YEAR_RE.is_match(trimmed) {
        trimmed.parse().ok()?
    } else {
        EMBEDDED_YEAR_RE
            .captures(trimmed)
            .and_then(|c| c[1].parse().ok())?
    };
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Strips the markup that shows up in Open Library description fields:
/// markdown links, "[Source][1]" references and their definition lines, HTML
/// tags and common entities, runs of whitespace.
pub fn clean_description(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = MARKDOWN_LINK_RE.replace_all(&text, "$1");
    let text = REFERENCE_LINK_RE.replace_all(&text, "$1");
    let text = LINK_DEFINITION_RE.replace_all(&text, "");
    let text = LINE_BREAK_TAG_RE.replace_all(&text, "\n");
    let text = HTML_TAG_RE.replace_all(&text, "");

    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    let text = SPACE_RUN_RE.replace_all(&text, " ");
    let text = BLANK_LINE_RUN_RE.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parses a series string like "Harry Potter #3" or "Foundation, 1" into a
/// name and optional position.
pub fn parse_series(text: &str) -> Option<Series> {
    let caps = SERIES_RE.captures(text.trim())?;
    let name = caps.get(1)?.as_str().trim().to_string();
    if name.is_empty() {
        return None;
    }
    let position = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
    Some(Series { name, position })
}
