//! RFC 6265 compliant cookie handling.
//!
//! A concurrent, expiry-aware store keyed by (name, domain, path). Matching
//! follows RFC 6265 §5.1.3 (domain) and §5.1.4 (path); storage follows
//! §5.2.3/§5.2.4 attribute normalization.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDateTime, Utc};
use http::Uri;

use crate::error::{Error, Result};

/// A parsed `Set-Cookie` value, before the jar computes effective
/// domain/path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Value was double-quoted in the header; serialization re-wraps it.
    pub wrapped: bool,
    /// Declared Domain attribute (leading dot stripped, lower-cased).
    pub domain: Option<String>,
    /// Declared Path attribute, kept only when it starts with `/`.
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            wrapped: false,
            domain: None,
            path: None,
            secure: false,
            http_only: false,
            max_age: None,
            expires: None,
        }
    }

    /// Set the Domain attribute (normalized as in a parsed header).
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(normalize_domain(&domain.into()));
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Parse a `Set-Cookie` header value.
    ///
    /// A header that nonsensically joins several cookies with commas
    /// (deprecated legacy form) yields only the *first* cookie; commas
    /// inside an Expires date are not separators.
    pub fn parse(header: &str) -> Result<Self> {
        let mut parts = header.split(';');

        let pair = parts
            .next()
            .ok_or_else(|| Error::cookie("empty Set-Cookie header"))?;
        let (name, raw_value) = pair
            .split_once('=')
            .ok_or_else(|| Error::cookie("no = in cookie pair"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::cookie("empty cookie name"));
        }

        // Legacy multi-cookie header: everything from the first separating
        // comma onwards belongs to a second cookie we do not accept.
        let mut raw_value = raw_value.trim();
        let mut truncated = false;
        if let Some(idx) = raw_value.find(',') {
            raw_value = raw_value[..idx].trim_end();
            truncated = true;
        }

        let (value, wrapped) = unwrap_value(raw_value);
        let mut cookie = Cookie::new(name, value);
        cookie.wrapped = wrapped;

        for attr in parts {
            if truncated {
                break;
            }
            let attr = attr.trim();
            if attr.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if attr.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            } else if let Some((key, mut val)) = attr.split_once('=') {
                let key = key.trim().to_ascii_lowercase();
                val = val.trim();
                // Commas are legitimate only inside an Expires date.
                if key != "expires" {
                    if let Some(idx) = val.find(',') {
                        val = val[..idx].trim_end();
                        truncated = true;
                    }
                }
                match key.as_str() {
                    "domain" => {
                        let d = normalize_domain(val);
                        if !d.is_empty() {
                            cookie.domain = Some(d);
                        }
                    }
                    "path" => {
                        if val.starts_with('/') {
                            cookie.path = Some(val.to_string());
                        }
                    }
                    "max-age" => cookie.max_age = val.parse().ok(),
                    "expires" => cookie.expires = parse_cookie_date(val),
                    _ => {}
                }
            }
        }
        Ok(cookie)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wrapped {
            write!(f, "{}=\"{}\"", self.name, self.value)
        } else {
            write!(f, "{}={}", self.name, self.value)
        }
    }
}

/// A cookie as held by the jar, with effective domain and path.
#[derive(Debug, Clone)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub wrapped: bool,
    /// Effective domain, lower-cased, no leading dot.
    pub domain: String,
    /// Effective path.
    pub path: String,
    /// No Domain attribute was declared: match the request host exactly.
    pub host_only: bool,
    pub secure: bool,
    pub http_only: bool,
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    seq: u64,
}

impl StoredCookie {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        if let Some(max_age) = self.max_age {
            return max_age <= 0 || (now - self.created_at).num_seconds() > max_age;
        }
        if let Some(expires) = self.expires {
            return expires <= now;
        }
        // Session cookie: never expired by this store.
        false
    }

    fn matches(&self, host: &str, path: &str, secure_uri: bool) -> bool {
        if self.secure && !secure_uri {
            return false;
        }
        domain_matches(host, &self.domain, self.host_only) && path_matches(&self.path, path)
    }

    /// The `name=value` pair as it appears in a `Cookie` header.
    pub fn pair(&self) -> String {
        if self.wrapped {
            format!("{}=\"{}\"", self.name, self.value)
        } else {
            format!("{}={}", self.name, self.value)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CookieKey {
    name: String,
    domain: String,
    path: String,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Thread-safe cookie jar.
///
/// Supports concurrent readers and writers; `get` additionally evicts
/// expired entries it encounters (read-triggered eviction) so the store
/// does not rely solely on a periodic sweep.
pub struct CookieJar {
    store: RwLock<HashMap<CookieKey, StoredCookie>>,
    seq: AtomicU64,
    clock: Clock,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Create a jar with an injected clock, for deterministic expiry.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            clock,
        }
    }

    /// Ingest a cookie set by a response for `uri`.
    ///
    /// An already-expired cookie (e.g. `Max-Age=0`) removes any existing
    /// entry for its key instead of being stored - a "deletion cookie".
    pub fn add(&self, uri: &Uri, cookie: Cookie) -> Result<()> {
        let host = uri
            .host()
            .map(|h| h.to_lowercase())
            .ok_or_else(|| Error::cookie("no host in URI"))?;

        let (domain, host_only) = match &cookie.domain {
            Some(d) => (d.clone(), false),
            None => (host, true),
        };
        let path = match &cookie.path {
            Some(p) => p.clone(),
            None => default_path(uri.path()),
        };
        let key = CookieKey {
            name: cookie.name.clone(),
            domain: domain.clone(),
            path: path.clone(),
        };

        let now = (self.clock)();
        let stored = StoredCookie {
            name: cookie.name,
            value: cookie.value,
            wrapped: cookie.wrapped,
            domain,
            path,
            host_only,
            secure: cookie.secure,
            http_only: cookie.http_only,
            max_age: cookie.max_age,
            expires: cookie.expires,
            created_at: now,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut store = self.store.write().expect("cookie store poisoned");
        if stored.expired(now) {
            store.remove(&key);
        } else {
            store.insert(key, stored);
        }
        Ok(())
    }

    /// Parse and ingest a raw `Set-Cookie` header value.
    pub fn add_from_header(&self, uri: &Uri, header: &str) -> Result<()> {
        self.add(uri, Cookie::parse(header)?)
    }

    /// Cookies matching `uri`, ordered by decreasing path length, ties
    /// broken by insertion order.
    pub fn get(&self, uri: &Uri) -> Vec<StoredCookie> {
        let host = match uri.host() {
            Some(h) => h.to_lowercase(),
            None => return Vec::new(),
        };
        let path = if uri.path().is_empty() { "/" } else { uri.path() };
        let secure_uri = matches!(uri.scheme_str(), Some("https") | Some("wss"));
        let now = (self.clock)();

        let mut store = self.store.write().expect("cookie store poisoned");
        store.retain(|_, c| !c.expired(now));

        let mut matched: Vec<StoredCookie> = store
            .values()
            .filter(|c| c.matches(&host, path, secure_uri))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then(a.seq.cmp(&b.seq))
        });
        matched
    }

    /// The `Cookie` header value for `uri`, if any cookie matches.
    pub fn cookie_header(&self, uri: &Uri) -> Option<String> {
        let cookies = self.get(uri);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(StoredCookie::pair)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// All unexpired cookies, in no particular order.
    pub fn get_all(&self) -> Vec<StoredCookie> {
        let now = (self.clock)();
        let mut store = self.store.write().expect("cookie store poisoned");
        store.retain(|_, c| !c.expired(now));
        store.values().cloned().collect()
    }

    /// Remove every cookie the predicate selects.
    pub fn remove(&self, predicate: impl Fn(&StoredCookie) -> bool) {
        let mut store = self.store.write().expect("cookie store poisoned");
        store.retain(|_, c| !predicate(c));
    }

    pub fn clear(&self) {
        self.store.write().expect("cookie store poisoned").clear();
    }

    /// Drop expired entries. Suitable for a periodic eviction task.
    pub fn evict_expired(&self) {
        let now = (self.clock)();
        let mut store = self.store.write().expect("cookie store poisoned");
        store.retain(|_, c| !c.expired(now));
    }

    pub fn len(&self) -> usize {
        self.store.read().expect("cookie store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieJar").field("len", &self.len()).finish()
    }
}

fn unwrap_value(raw: &str) -> (String, bool) {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        (raw[1..raw.len() - 1].to_string(), true)
    } else {
        (raw.to_string(), false)
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.strip_prefix('.').unwrap_or(domain).to_lowercase()
}

/// RFC 6265 §5.1.4 default-path: the request path truncated to its last
/// `/`, or `/` when the path is empty or rootless.
fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

/// RFC 6265 §5.1.3 domain matching. Host-only cookies require equality;
/// declared domains also accept any subdomain.
fn domain_matches(request_host: &str, cookie_domain: &str, host_only: bool) -> bool {
    if request_host == cookie_domain {
        return true;
    }
    !host_only && request_host.ends_with(&format!(".{cookie_domain}"))
}

/// RFC 6265 §5.1.4 path matching.
fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == request_path {
        return true;
    }
    if let Some(rest) = request_path.strip_prefix(cookie_path) {
        return cookie_path.ends_with('/') || rest.starts_with('/');
    }
    false
}

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    for fmt in [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    /// Jar with a controllable clock, plus the knob that advances it.
    fn jar_with_clock() -> (CookieJar, Arc<AtomicI64>) {
        let offset = Arc::new(AtomicI64::new(0));
        let base = Utc::now();
        let clock_offset = offset.clone();
        let jar = CookieJar::with_clock(Arc::new(move || {
            base + chrono::Duration::seconds(clock_offset.load(Ordering::SeqCst))
        }));
        (jar, offset)
    }

    #[test]
    fn test_parse_basic_pair() {
        let c = Cookie::parse("SID=31d4d96e407aad42").unwrap();
        assert_eq!(c.name, "SID");
        assert_eq!(c.value, "31d4d96e407aad42");
        assert!(!c.secure);
        assert!(c.domain.is_none());
    }

    #[test]
    fn test_parse_attributes() {
        let c = Cookie::parse("SID=abc; Path=/; Domain=.Example.COM; Secure; HttpOnly; Max-Age=60")
            .unwrap();
        assert_eq!(c.domain.as_deref(), Some("example.com"));
        assert_eq!(c.path.as_deref(), Some("/"));
        assert!(c.secure);
        assert!(c.http_only);
        assert_eq!(c.max_age, Some(60));
    }

    #[test]
    fn test_parse_quoted_value_round_trips() {
        let c = Cookie::parse("token=\"abc def\"").unwrap();
        assert_eq!(c.value, "abc def");
        assert!(c.wrapped);
        assert_eq!(c.to_string(), "token=\"abc def\"");
    }

    #[test]
    fn test_parse_rejects_nameless() {
        assert!(Cookie::parse("=nope").is_err());
        assert!(Cookie::parse("no-equals-sign").is_err());
    }

    #[test]
    fn test_legacy_multi_cookie_keeps_first() {
        let c = Cookie::parse("a=1, b=2; Path=/x").unwrap();
        assert_eq!(c.name, "a");
        assert_eq!(c.value, "1");
        assert!(c.path.is_none());

        let c = Cookie::parse("a=1; Path=/p, b=2; Domain=evil.example").unwrap();
        assert_eq!(c.path.as_deref(), Some("/p"));
        assert!(c.domain.is_none());
    }

    #[test]
    fn test_expires_commas_are_not_separators() {
        let c = Cookie::parse("a=1; Expires=Sun, 06 Nov 1994 08:49:37 GMT; Path=/p").unwrap();
        assert!(c.expires.is_some());
        assert_eq!(c.path.as_deref(), Some("/p"));
    }

    #[test]
    fn test_host_only_requires_exact_host() {
        let jar = CookieJar::new();
        jar.add(&uri("http://example.com/"), Cookie::new("a", "1")).unwrap();

        assert_eq!(jar.get(&uri("http://example.com/")).len(), 1);
        assert!(jar.get(&uri("http://sub.example.com/")).is_empty());
    }

    #[test]
    fn test_declared_domain_matches_subdomains() {
        let jar = CookieJar::new();
        jar.add(
            &uri("http://example.com/"),
            Cookie::new("a", "1").with_domain(".example.com"),
        )
        .unwrap();

        assert_eq!(jar.get(&uri("http://example.com/")).len(), 1);
        assert_eq!(jar.get(&uri("http://sub.example.com/")).len(), 1);
        assert!(jar.get(&uri("http://notexample.com/")).is_empty());
        // Suffix match must be on a label boundary.
        assert!(jar.get(&uri("http://badexample.com/")).is_empty());
    }

    #[test]
    fn test_path_prefix_rule() {
        let jar = CookieJar::new();
        jar.add(
            &uri("http://example.com/"),
            Cookie::new("a", "1").with_path("/a"),
        )
        .unwrap();

        assert_eq!(jar.get(&uri("http://example.com/a")).len(), 1);
        assert_eq!(jar.get(&uri("http://example.com/a/")).len(), 1);
        assert_eq!(jar.get(&uri("http://example.com/a/b")).len(), 1);
        assert!(jar.get(&uri("http://example.com/ab")).is_empty());
        assert!(jar.get(&uri("http://example.com/")).is_empty());
    }

    #[test]
    fn test_default_path_computation() {
        assert_eq!(default_path("/a/b/c"), "/a/b");
        assert_eq!(default_path("/a"), "/");
        assert_eq!(default_path("/"), "/");
        assert_eq!(default_path(""), "/");
        assert_eq!(default_path("rootless"), "/");
    }

    #[test]
    fn test_secure_cookie_filtered_for_plain_http() {
        let jar = CookieJar::new();
        jar.add(
            &uri("https://example.com/"),
            Cookie::new("s", "1").with_secure(true),
        )
        .unwrap();

        assert!(jar.get(&uri("http://example.com/")).is_empty());
        assert_eq!(jar.get(&uri("https://example.com/")).len(), 1);
    }

    #[test]
    fn test_deletion_cookie_removes_entry() {
        let jar = CookieJar::new();
        let u = uri("http://example.com/");
        jar.add(&u, Cookie::new("a", "1")).unwrap();
        assert_eq!(jar.len(), 1);

        jar.add(&u, Cookie::new("a", "").with_max_age(0)).unwrap();
        assert!(jar.get_all().is_empty());
    }

    #[test]
    fn test_max_age_expiry_with_simulated_clock() {
        let (jar, clock) = jar_with_clock();
        let u = uri("http://example.com/");
        jar.add(&u, Cookie::new("a", "1").with_max_age(2)).unwrap();

        assert_eq!(jar.get(&u).len(), 1);
        clock.store(3, Ordering::SeqCst);
        assert!(jar.get(&u).is_empty());
        // Read-triggered eviction removed it from the store entirely.
        assert!(jar.is_empty());
    }

    #[test]
    fn test_session_cookie_never_expires() {
        let (jar, clock) = jar_with_clock();
        let u = uri("http://example.com/");
        jar.add(&u, Cookie::new("a", "1")).unwrap();
        clock.store(10_000_000, Ordering::SeqCst);
        assert_eq!(jar.get(&u).len(), 1);
    }

    #[test]
    fn test_key_uniqueness_replaces_value() {
        let jar = CookieJar::new();
        let u = uri("http://example.com/");
        jar.add(&u, Cookie::new("a", "1")).unwrap();
        jar.add(&u, Cookie::new("a", "2")).unwrap();

        let got = jar.get(&u);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].value, "2");
    }

    #[test]
    fn test_header_ordering_longest_path_first() {
        let jar = CookieJar::new();
        let u = uri("http://example.com/a/b/c");
        jar.add(&u, Cookie::new("root", "1").with_path("/")).unwrap();
        jar.add(&u, Cookie::new("deep", "2").with_path("/a/b")).unwrap();
        jar.add(&u, Cookie::new("mid", "3").with_path("/a")).unwrap();

        let header = jar.cookie_header(&u).unwrap();
        assert_eq!(header, "deep=2; mid=3; root=1");
    }

    #[test]
    fn test_header_ordering_ties_by_insertion() {
        let jar = CookieJar::new();
        let u = uri("http://example.com/a");
        jar.add(&u, Cookie::new("first", "1").with_path("/a")).unwrap();
        jar.add(&u, Cookie::new("second", "2").with_path("/a")).unwrap();

        assert_eq!(jar.cookie_header(&u).unwrap(), "first=1; second=2");
    }

    #[test]
    fn test_remove_predicate_and_clear() {
        let jar = CookieJar::new();
        let u = uri("http://example.com/");
        jar.add(&u, Cookie::new("keep", "1")).unwrap();
        jar.add(&u, Cookie::new("drop", "2")).unwrap();

        jar.remove(|c| c.name == "drop");
        assert_eq!(jar.len(), 1);

        jar.clear();
        assert!(jar.is_empty());
    }

    #[test]
    fn test_cookie_date_formats() {
        assert!(parse_cookie_date("Sun, 06 Nov 1994 08:49:37 GMT").is_some());
        assert!(parse_cookie_date("Sunday, 06-Nov-94 08:49:37 GMT").is_some());
        assert!(parse_cookie_date("Sun Nov  6 08:49:37 1994").is_some());
        assert!(parse_cookie_date("not a date").is_none());
    }
}
