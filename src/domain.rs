//! Hostname normalization, registrable-root (eTLD+1) lookup and scope checks.
//!
//! Everything here is pure and cheap; the scheduler and workers call these
//! functions on every candidate, so no allocation beyond the normalized
//! string itself.

/// Lowercase and trim a candidate hostname. Returns `None` when the trimmed
/// string is empty or contains a byte outside `[a-z0-9.-]`.
pub fn normalize(s: &str) -> Option<String> {
    let t = s.trim().to_ascii_lowercase();
    if t.is_empty() {
        return None;
    }
    if !t
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return None;
    }
    Some(t)
}

/// Syntax check for an already-normalized hostname: 1-253 bytes, at least
/// one dot, labels of 1-63 bytes not starting or ending with `-`.
pub fn is_valid_hostname(h: &str) -> bool {
    if h.is_empty() || h.len() > 253 || !h.contains('.') {
        return false;
    }
    for label in h.split('.') {
        let b = label.as_bytes();
        if b.is_empty() || b.len() > 63 {
            return false;
        }
        if b[0] == b'-' || b[b.len() - 1] == b'-' {
            return false;
        }
        if !b
            .iter()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'-')
        {
            return false;
        }
    }
    true
}

/// Registrable root (eTLD+1) of a hostname, per the Public Suffix List.
pub fn root_of(h: &str) -> Option<String> {
    psl::domain_str(h).map(|d| d.to_string())
}

/// Label distance from `h` down to `root`: 0 when equal, otherwise the
/// number of labels above the root. -1 when `h` is not under `root`.
pub fn depth(h: &str, root: &str) -> i32 {
    if h == root {
        return 0;
    }
    match h.strip_suffix(root).and_then(|p| p.strip_suffix('.')) {
        Some(prefix) => prefix.matches('.').count() as i32 + 1,
        None => -1,
    }
}

/// True when `h` equals some root in `roots` or ends with `"." + root`.
pub fn in_scope(h: &str, roots: &[String]) -> bool {
    roots.iter().any(|r| matches_root(h, r))
}

fn matches_root(h: &str, root: &str) -> bool {
    h == root || (h.len() > root.len() && h.ends_with(root) && h.as_bytes()[h.len() - root.len() - 1] == b'.')
}

/// The set of in-scope registrable roots for one run.
///
/// Each configured seed is reduced to its eTLD+1; seeds the PSL cannot place
/// (private zones, bare test names) are kept verbatim so they still anchor a
/// suffix scope.
#[derive(Debug, Clone)]
pub struct Scope {
    roots: Vec<String>,
}

impl Scope {
    pub fn new(seeds: &[String]) -> Self {
        let mut roots: Vec<String> = Vec::new();
        for s in seeds {
            let Some(h) = normalize(s) else { continue };
            let root = root_of(&h).unwrap_or(h);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        Scope { roots }
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// First configured root that `h` falls under, if any.
    pub fn match_root(&self, h: &str) -> Option<&str> {
        self.roots
            .iter()
            .find(|r| matches_root(h, r))
            .map(|r| r.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize("  WWW.Example.COM  "), Some("www.example.com".into()));
        assert_eq!(normalize("ex ample.com"), None);
        assert_eq!(normalize("exa_mple.com"), None);
        assert_eq!(normalize("   "), None);
    }

    #[test]
    fn hostname_syntax() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("a.b.example.com"));
        assert!(is_valid_hostname("dds.d"));
        assert!(!is_valid_hostname("example"));
        assert!(!is_valid_hostname(".example.com"));
        assert!(!is_valid_hostname("example..com"));
        assert!(!is_valid_hostname("-a.example.com"));
        assert!(!is_valid_hostname("a-.example.com"));
        let long_label = format!("{}.com", "a".repeat(64));
        assert!(!is_valid_hostname(&long_label));
        let long_host = format!("{}.example.com", "a.".repeat(130));
        assert!(!is_valid_hostname(&long_host));
    }

    #[test]
    fn root_of_uses_public_suffix_list() {
        assert_eq!(root_of("www.tsinghua.edu.cn"), Some("tsinghua.edu.cn".into()));
        assert_eq!(root_of("a.b.example.com"), Some("example.com".into()));
        assert_eq!(root_of("example.com"), Some("example.com".into()));
    }

    #[test]
    fn depth_counts_labels_above_root() {
        assert_eq!(depth("tsinghua.edu.cn", "tsinghua.edu.cn"), 0);
        assert_eq!(depth("www.tsinghua.edu.cn", "tsinghua.edu.cn"), 1);
        assert_eq!(depth("a.b.tsinghua.edu.cn", "tsinghua.edu.cn"), 2);
        assert_eq!(depth("other.com", "tsinghua.edu.cn"), -1);
        // same suffix text but not a label boundary
        assert_eq!(depth("evil-tsinghua.edu.cn", "tsinghua.edu.cn"), -1);
    }

    #[test]
    fn scope_membership() {
        let roots = vec!["tsinghua.edu.cn".to_string()];
        assert!(in_scope("tsinghua.edu.cn", &roots));
        assert!(in_scope("www.tsinghua.edu.cn", &roots));
        assert!(!in_scope("evil-tsinghua.edu.cn", &roots));
        assert!(!in_scope("tsinghua.edu.cn.evil.com", &roots));
    }

    #[test]
    fn scope_reduces_seeds_to_roots() {
        let scope = Scope::new(&[
            "www.tsinghua.edu.cn".to_string(),
            "Example.COM".to_string(),
            "tsinghua.edu.cn".to_string(),
        ]);
        assert_eq!(scope.roots(), &["tsinghua.edu.cn".to_string(), "example.com".to_string()]);
        assert_eq!(scope.match_root("mail.tsinghua.edu.cn"), Some("tsinghua.edu.cn"));
        assert_eq!(scope.match_root("foo.example.com"), Some("example.com"));
        assert_eq!(scope.match_root("attacker.com"), None);
    }
}
