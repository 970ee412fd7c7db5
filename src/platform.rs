//! Platform classification from URL hosts
//!
//! A pure, total mapping: any syntactically valid URL classifies to exactly
//! one [`Platform`], falling back to [`Platform::Generic`] for unknown hosts.
//! There is no failure mode and no side effect.

use crate::types::Platform;
use url::Url;

/// Known (platform, host suffixes) pairs, checked in order.
///
/// A URL matches a pattern when its host equals the suffix or ends with
/// `.{suffix}` — so `m.youtube.com` and `music.youtube.com` both classify
/// as Youtube without matching impostors like `notyoutube.com`.
const HOST_PATTERNS: &[(Platform, &[&str])] = &[
    (Platform::Youtube, &["youtube.com", "youtu.be"]),
    (Platform::Instagram, &["instagram.com", "instagr.am"]),
    (Platform::Tiktok, &["tiktok.com"]),
    (Platform::Twitter, &["twitter.com", "x.com", "t.co"]),
    (Platform::Facebook, &["facebook.com", "fb.watch", "fb.com"]),
    (Platform::Pinterest, &["pinterest.com", "pin.it"]),
];

impl Platform {
    /// Classify a URL by its host component
    ///
    /// Matching is case-insensitive (the `url` crate lowercases registered
    /// domain hosts during parsing). URLs without a host — or with an IP
    /// address host — classify as [`Platform::Generic`].
    pub fn classify(url: &Url) -> Platform {
        let Some(host) = url.host_str() else {
            return Platform::Generic;
        };
        // Url lowercases registered domains, but not every host
        // representation is guaranteed normalized
        let host = host.to_ascii_lowercase();

        for (platform, suffixes) in HOST_PATTERNS {
            if suffixes.iter().any(|s| host_matches(&host, s)) {
                return *platform;
            }
        }
        Platform::Generic
    }
}

/// Whether `host` is `suffix` itself or a subdomain of it
fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix
        || (host.len() > suffix.len()
            && host.ends_with(suffix)
            && host.as_bytes()[host.len() - suffix.len() - 1] == b'.')
}
