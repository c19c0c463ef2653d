//! Domain-token and `<title>` extraction from raw response bytes.
//!
//! Both scanners are incremental state machines fed chunk by chunk, so the
//! fetcher never has to hold a whole body in memory. The domain scanner also
//! understands percent-encoding: `%2F` and friends act as token boundaries
//! instead of gluing neighboring runs together, while an escape that decodes
//! to a domain byte is folded into the current token.

const MAX_HOSTNAME: usize = 253;
const MAX_TITLE: usize = 2048;

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// Canonical domain bytes. Decoded escapes are held to this stricter set:
// an uppercase byte hidden behind %XX separates tokens instead of joining
// them, matching how obfuscated URLs embed hosts between encoded slashes.
fn is_domain_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-'
}

fn is_raw_domain_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'-'
}

#[derive(Clone, Copy)]
enum Escape {
    None,
    /// Saw `%`.
    Percent,
    /// Saw `%` plus one hex digit (kept verbatim for replay).
    Hex(u8),
}

/// Incremental scanner that accumulates runs of domain bytes and emits every
/// run that survives hostname validation.
pub struct DomainScanner {
    buf: Vec<u8>,
    overflow: bool,
    esc: Escape,
    found: Vec<String>,
}

impl Default for DomainScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainScanner {
    pub fn new() -> Self {
        DomainScanner {
            buf: Vec::with_capacity(64),
            overflow: false,
            esc: Escape::None,
            found: Vec::new(),
        }
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) {
        for &b in chunk {
            self.feed(b);
        }
    }

    /// Flush any pending escape state and the trailing token.
    pub fn finish(&mut self) {
        match std::mem::replace(&mut self.esc, Escape::None) {
            Escape::Hex(d) => {
                self.boundary();
                self.feed(d);
            }
            Escape::Percent => self.boundary(),
            Escape::None => {}
        }
        self.boundary();
    }

    pub fn take_found(&mut self) -> Vec<String> {
        std::mem::take(&mut self.found)
    }

    fn feed(&mut self, b: u8) {
        match self.esc {
            Escape::None => {
                if b == b'%' {
                    self.esc = Escape::Percent;
                } else {
                    self.raw(b);
                }
            }
            Escape::Percent => {
                if hex_val(b).is_some() {
                    self.esc = Escape::Hex(b);
                } else {
                    // lone '%' is a separator; the current byte is ordinary input
                    self.esc = Escape::None;
                    self.boundary();
                    self.feed(b);
                }
            }
            Escape::Hex(first) => {
                self.esc = Escape::None;
                if let Some(lo) = hex_val(b) {
                    let decoded = (hex_val(first).unwrap() << 4) | lo;
                    if is_domain_byte(decoded) {
                        self.accept(decoded);
                    } else {
                        self.boundary();
                    }
                } else {
                    // half escape: '%' separates, the hex digit was plain text
                    self.boundary();
                    self.feed(first);
                    self.feed(b);
                }
            }
        }
    }

    fn raw(&mut self, b: u8) {
        if is_raw_domain_byte(b) {
            self.accept(b.to_ascii_lowercase());
        } else {
            self.boundary();
        }
    }

    fn accept(&mut self, b: u8) {
        if self.overflow {
            return;
        }
        if self.buf.len() >= MAX_HOSTNAME {
            self.overflow = true;
            self.buf.clear();
            return;
        }
        self.buf.push(b);
    }

    fn boundary(&mut self) {
        if self.overflow {
            self.overflow = false;
            self.buf.clear();
            return;
        }
        if self.buf.is_empty() {
            return;
        }
        let token = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        // a trailing dot or hyphen invalidates the run; no repair attempts
        if crate::domain::is_valid_hostname(&token) {
            self.found.push(token);
        }
    }
}

/// One-shot extraction over a byte slice.
pub fn extract_domains(data: &[u8]) -> Vec<String> {
    let mut scanner = DomainScanner::new();
    scanner.push_bytes(data);
    scanner.finish();
    scanner.take_found()
}

/// Keep only candidates equal to `root` or ending in `"." + root`,
/// dropping duplicates while preserving discovery order.
pub fn filter_by_suffix(candidates: Vec<String>, root: &str) -> Vec<String> {
    if root.is_empty() {
        return Vec::new();
    }
    let dotted = format!(".{}", root);
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|d| d == root || d.ends_with(&dotted))
        .filter(|d| seen.insert(d.clone()))
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum TitleState {
    /// Matching the bytes of `<title`.
    Open(usize),
    /// Matched `<title`; the next byte decides whether this is really the tag.
    AfterName,
    /// Inside the opening tag, waiting for `>`.
    Attrs,
    /// Capturing text, matching the bytes of `</title`.
    Text(usize),
    Done,
}

/// Incremental, case-insensitive `<title>` capture.
pub struct TitleScanner {
    state: TitleState,
    captured: Vec<u8>,
}

const OPEN_TAG: &[u8] = b"<title";
const CLOSE_TAG: &[u8] = b"</title";

impl Default for TitleScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl TitleScanner {
    pub fn new() -> Self {
        TitleScanner {
            state: TitleState::Open(0),
            captured: Vec::new(),
        }
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) {
        for &b in chunk {
            if self.state == TitleState::Done {
                return;
            }
            self.feed(b);
        }
    }

    /// Captured title with whitespace collapsed to single spaces. Empty
    /// unless a complete `<title>...</title>` element was seen.
    pub fn title(&self) -> String {
        if self.state != TitleState::Done {
            return String::new();
        }
        let text = String::from_utf8_lossy(&self.captured);
        let mut out = String::with_capacity(text.len());
        let mut in_space = true;
        for c in text.chars() {
            if c.is_whitespace() {
                if !in_space {
                    out.push(' ');
                    in_space = true;
                }
            } else {
                out.push(c);
                in_space = false;
            }
        }
        while out.ends_with(' ') {
            out.pop();
        }
        out
    }

    fn feed(&mut self, b: u8) {
        match self.state {
            TitleState::Open(n) => {
                if b.to_ascii_lowercase() == OPEN_TAG[n] {
                    self.state = if n + 1 == OPEN_TAG.len() {
                        TitleState::AfterName
                    } else {
                        TitleState::Open(n + 1)
                    };
                } else {
                    self.state = TitleState::Open(usize::from(b == b'<'));
                }
            }
            TitleState::AfterName => {
                if b == b'>' {
                    self.state = TitleState::Text(0);
                } else if b.is_ascii_whitespace() {
                    self.state = TitleState::Attrs;
                } else {
                    // "<titlebar" or similar: not the title tag, rescan
                    self.state = TitleState::Open(0);
                    self.feed(b);
                }
            }
            TitleState::Attrs => {
                if b == b'>' {
                    self.state = TitleState::Text(0);
                }
            }
            TitleState::Text(n) => {
                if b.to_ascii_lowercase() == CLOSE_TAG[n] {
                    if n + 1 == CLOSE_TAG.len() {
                        self.state = TitleState::Done;
                    } else {
                        self.state = TitleState::Text(n + 1);
                    }
                } else {
                    self.capture(&CLOSE_TAG[..n]);
                    if b == b'<' {
                        self.state = TitleState::Text(1);
                    } else {
                        self.capture(&[b]);
                        self.state = TitleState::Text(0);
                    }
                }
            }
            TitleState::Done => {}
        }
    }

    fn capture(&mut self, bytes: &[u8]) {
        let room = MAX_TITLE.saturating_sub(self.captured.len());
        self.captured.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }
}

/// One-shot title extraction over a byte slice.
pub fn extract_title(data: &[u8]) -> String {
    let mut scanner = TitleScanner::new();
    scanner.push_bytes(data);
    scanner.title()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tokens_between_separators() {
        assert_eq!(
            extract_domains(b"dhsjkalhfjklh.nxs.,cnd,.f/tsinghua.edu.cn|dds.d/"),
            vec!["tsinghua.edu.cn", "dds.d"]
        );
    }

    #[test]
    fn encoded_slash_separates_and_host_survives() {
        assert_eq!(
            extract_domains(b"dhsjkalhfjklh.nxs.,cnd,.f/tsinghua.edu.cn|dds.d/%2fgithub.com"),
            vec!["tsinghua.edu.cn", "dds.d", "github.com"]
        );
        assert_eq!(
            extract_domains(b"https%3A%2F%2Fm.smugmug.com%2F"),
            vec!["m.smugmug.com"]
        );
        assert_eq!(
            extract_domains(b"=https%3A%2F%2Fm.smugmug.com%2F&"),
            vec!["m.smugmug.com"]
        );
    }

    #[test]
    fn stray_percent_forms() {
        assert_eq!(extract_domains(b"=https%3A%2F%2F%m.smugmug.com%2F&"), vec!["m.smugmug.com"]);
        assert_eq!(extract_domains(b"=https%3A%2F%2F%%m.smugmug.com%2F&"), vec!["m.smugmug.com"]);
        // "%4x" is not an escape: the digit stays in the stream
        assert_eq!(
            extract_domains(b"=https%3A%2F%2F%%4xm.smugmug.com%2F&"),
            vec!["4xm.smugmug.com"]
        );
        // "%44" decodes to 'D', which is a separator, not a domain byte
        assert_eq!(
            extract_domains(b"=https%3A%2F%2F%%44m.smugmug.com%2F&"),
            vec!["m.smugmug.com"]
        );
    }

    #[test]
    fn html_anchors_in_order() {
        let body = br#"
        <li><a href="https://classx.pku.edu.cn/cloudCourse/#/index">live</a></li>
        <li><a href="https://mail.pku.edu.cn/">mail</a></li>
        "#;
        assert_eq!(extract_domains(body), vec!["classx.pku.edu.cn", "mail.pku.edu.cn"]);
    }

    #[test]
    fn csp_header_value() {
        assert_eq!(
            extract_domains(b"policy: 'self' wappass.baidu.com:*"),
            vec!["wappass.baidu.com"]
        );
    }

    #[test]
    fn uppercase_input_is_lowercased() {
        assert_eq!(extract_domains(b"Visit WWW.Example.COM today"), vec!["www.example.com"]);
    }

    #[test]
    fn overlong_runs_are_dropped() {
        let long = format!("x{}.example.com", "a".repeat(300));
        assert!(extract_domains(long.as_bytes()).is_empty());
        // and the scanner recovers afterwards
        let mixed = format!("{} ok.example.com", long);
        assert_eq!(extract_domains(mixed.as_bytes()), vec!["ok.example.com"]);
    }

    #[test]
    fn every_token_is_a_valid_hostname() {
        // pseudo-random bytes; derived from a fixed seed so the test is stable
        let mut state = 0x243f_6a88u32;
        let noise: Vec<u8> = (0..4096)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect();
        for token in extract_domains(&noise) {
            assert!(crate::domain::is_valid_hostname(&token), "bad token {token:?}");
            assert!(token.contains('.'));
        }
    }

    #[test]
    fn chunked_input_matches_one_shot() {
        let body = b"=https%3A%2F%2Fm.smugmug.com%2F& <a href=\"https://a.b.example.com/\">";
        let whole = extract_domains(body);
        for split in 1..body.len() {
            let mut scanner = DomainScanner::new();
            scanner.push_bytes(&body[..split]);
            scanner.push_bytes(&body[split..]);
            scanner.finish();
            assert_eq!(scanner.take_found(), whole, "split at {split}");
        }
    }

    #[test]
    fn suffix_filter() {
        let root = "tsinghua.edu.cn";
        let candidates = vec![
            "index.css".to_string(),
            "www.tsinghua.edu.cn".to_string(),
            "jobs.tsinghua.edu.cn".to_string(),
            "tsinghua.edu.cn".to_string(),
            "evil-tsinghua.edu.cn".to_string(),
            "www.tsinghua.edu.cn".to_string(),
            "other.com".to_string(),
        ];
        assert_eq!(
            filter_by_suffix(candidates, root),
            vec!["www.tsinghua.edu.cn", "jobs.tsinghua.edu.cn", "tsinghua.edu.cn"]
        );
        assert!(filter_by_suffix(vec!["a.b".into()], "").is_empty());
    }

    #[test]
    fn title_basics() {
        assert_eq!(extract_title(b"<html><title>Hello</title></html>"), "Hello");
        assert_eq!(extract_title(b"<TITLE lang=\"en\">Mixed Case</TITLE>"), "Mixed Case");
        assert_eq!(
            extract_title(b"<title>\n  spread \t over\r\n lines  </title>"),
            "spread over lines"
        );
        assert_eq!(extract_title(b"no title here"), "");
        // angle bracket inside the text does not end the capture
        assert_eq!(extract_title(b"<title>a < b</title>"), "a < b");
    }

    #[test]
    fn title_streams_across_chunks() {
        let body = b"xx<title class=\"t\">Split  Title</title>yy";
        let whole = extract_title(body);
        assert_eq!(whole, "Split Title");
        for split in 1..body.len() {
            let mut scanner = TitleScanner::new();
            scanner.push_bytes(&body[..split]);
            scanner.push_bytes(&body[split..]);
            assert_eq!(scanner.title(), whole, "split at {split}");
        }
    }
}
