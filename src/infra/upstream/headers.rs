//! Conditional-fetch metadata: validators, freshness lifetime and error-budget headers.

use std::collections::BTreeMap;

use reqwest::header::{
    AGE, CACHE_CONTROL, DATE, ETAG, EXPIRES, HeaderMap, HeaderName, HeaderValue, IF_NONE_MATCH,
    LAST_MODIFIED, RETRY_AFTER,
};
use time::{OffsetDateTime, PrimitiveDateTime, macros::format_description};

pub const ERROR_LIMIT_REMAIN: HeaderName = HeaderName::from_static("x-esi-error-limit-remain");
pub const ERROR_LIMIT_RESET: HeaderName = HeaderName::from_static("x-esi-error-limit-reset");

/// Parsed `Cache-Control` directives. Names are lower-cased, quoted values unquoted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: BTreeMap<String, Option<String>>,
}

impl CacheControl {
    pub fn parse(raw: &str) -> Self {
        let directives = raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((name, value)) => (
                    name.trim().to_ascii_lowercase(),
                    Some(unquote(value.trim()).to_string()),
                ),
                None => (part.to_ascii_lowercase(), None),
            })
            .collect();
        Self { directives }
    }

    pub fn has(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.directives.get(name)?.as_deref()
    }

    /// Responses that must not be reused without revalidation.
    pub fn forbids_reuse(&self) -> bool {
        self.has("no-store") || self.has("no-cache")
    }

    pub fn max_age(&self) -> Option<u64> {
        self.value("max-age").and_then(parse_digits)
    }
}

/// Validators and freshness inputs extracted from one upstream response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseValidators {
    /// Stored verbatim, including quotes and any weak prefix.
    pub entity_tag: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
    pub expires: Option<OffsetDateTime>,
    pub date: Option<OffsetDateTime>,
    pub cache_control: CacheControl,
}

impl ResponseValidators {
    pub fn extract(headers: &HeaderMap) -> Self {
        Self {
            entity_tag: header_str(headers, &ETAG).map(str::to_string),
            last_modified: header_str(headers, &LAST_MODIFIED).and_then(parse_http_date),
            expires: header_str(headers, &EXPIRES).and_then(parse_http_date),
            date: header_str(headers, &DATE).and_then(parse_http_date),
            cache_control: header_str(headers, &CACHE_CONTROL)
                .map(CacheControl::parse)
                .unwrap_or_default(),
        }
    }
}

/// Freshness lifetime in seconds, measured against the upstream's own `Date` header.
///
/// `None` means the response carried nothing to derive a lifetime from.
pub fn compute_ttl(headers: &HeaderMap, now: OffsetDateTime) -> Option<u64> {
    let validators = ResponseValidators::extract(headers);
    let server_now = validators.date.unwrap_or(now);

    if validators.cache_control.forbids_reuse() {
        return Some(0);
    }

    if let Some(max_age) = validators.cache_control.max_age() {
        let age = header_str(headers, &AGE)
            .and_then(parse_digits)
            .unwrap_or_else(|| whole_seconds_between(server_now, now));
        return Some(max_age.saturating_sub(age));
    }

    validators
        .expires
        .map(|expires| whole_seconds_between(server_now, expires))
}

/// `If-None-Match` for a stored entity tag; nothing when there is no tag.
pub fn conditional_headers(entity_tag: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = entity_tag
        .filter(|tag| !tag.is_empty())
        .and_then(|tag| HeaderValue::from_str(tag).ok())
    {
        headers.insert(IF_NONE_MATCH, value);
    }
    headers
}

/// `X-ESI-Error-Limit-Remain` / `X-ESI-Error-Limit-Reset`, present only as a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    pub remaining: u32,
    pub reset_seconds: u64,
}

impl ErrorBudget {
    pub fn extract(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_str(headers, &ERROR_LIMIT_REMAIN)?.parse().ok()?;
        let reset_seconds = header_str(headers, &ERROR_LIMIT_RESET)?.parse().ok()?;
        Some(Self {
            remaining,
            reset_seconds,
        })
    }
}

/// `Retry-After` in its delta-seconds form.
pub fn retry_after(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, &RETRY_AFTER).and_then(parse_digits)
}

/// IMF-fixdate, e.g. `Wed, 01 Oct 2025 12:00:00 GMT`.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    PrimitiveDateTime::parse(value.trim(), format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_digits(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn unquote(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}

fn whole_seconds_between(from: OffsetDateTime, to: OffsetDateTime) -> u64 {
    u64::try_from((to - from).whole_seconds()).unwrap_or(0)
}
