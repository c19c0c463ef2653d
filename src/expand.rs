//! Seed expansion: a bare registrable domain fans out to a fixed list of
//! common service prefixes before crawling starts. Hostnames that already
//! carry a subdomain pass through untouched.

use crate::domain;

pub const COMMON_PREFIXES: &[&str] = &[
    "www", "mail", "api", "cdn", "admin", "dev", "test", "vpn", "webmail", "blog", "shop",
    "portal", "news", "ftp", "m", "forum", "bbs", "cloud", "email", "secure", "remote",
    "support", "wiki", "community",
];

/// `example.com` becomes itself plus `www.example.com`, `mail.example.com`,
/// and so on; `already.sub.example.com` is returned unchanged.
pub fn expand_seed(host: &str) -> Vec<String> {
    match domain::root_of(host) {
        Some(root) if root == host => {
            let mut out = Vec::with_capacity(COMMON_PREFIXES.len() + 1);
            out.push(host.to_string());
            for prefix in COMMON_PREFIXES {
                out.push(format!("{}.{}", prefix, host));
            }
            out
        }
        _ => vec![host.to_string()],
    }
}
