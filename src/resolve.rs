//! DNS enrichment and wildcard detection.
//!
//! Queries are raw UDP packets against the configured servers, tried in
//! order until one answers; an empty server list falls back to the system
//! resolver. Resolution is enrichment only: it never gates fetching, and a
//! failure leaves the result's error field alone.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::UdpSocket;
use std::time::Duration;
use trust_dns_proto::op::{Message, MessageType, OpCode, Query};
use trust_dns_proto::rr::{Name, RData, RecordType};
use trust_dns_proto::serialize::binary::{BinDecodable, BinEncodable, BinEncoder};

#[async_trait]
pub trait Resolve: Send + Sync {
    /// A/AAAA addresses for a hostname. No records is `(vec![], None)`;
    /// the error slot is for transport-level failures only.
    async fn resolve(&self, host: &str) -> (Vec<String>, Option<String>);
}

fn build_query(domain: &str, qtype: RecordType) -> Result<Vec<u8>> {
    let mut msg = Message::new();
    msg.set_id(rand::random::<u16>());
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let name = Name::from_utf8(domain)?;
    msg.add_query(Query::query(name, qtype));
    let mut buf: Vec<u8> = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    msg.emit(&mut encoder)?;
    Ok(buf)
}

fn udp_query(domain: &str, server: &str, qtype: RecordType, timeout: Duration) -> Result<Vec<String>> {
    let packet = build_query(domain, qtype)?;
    let sock = UdpSocket::bind("0.0.0.0:0")?;
    sock.set_read_timeout(Some(timeout))?;
    let target = if server.contains(':') {
        server.to_string()
    } else {
        format!("{}:53", server)
    };
    sock.send_to(&packet, &target)?;
    let mut recv = [0u8; 2048];
    let n = sock.recv(&mut recv)?;
    let msg = Message::from_bytes(&recv[..n])?;
    let mut ips = Vec::new();
    for rec in msg.answers() {
        if let Some(data) = rec.data() {
            match data {
                RData::A(ip) => ips.push(ip.to_string()),
                RData::AAAA(ip) => ips.push(ip.to_string()),
                _ => {}
            }
        }
    }
    Ok(ips)
}

// A first, AAAA only when A came back empty; first answering server wins.
fn lookup_all(domain: &str, servers: &[String], timeout: Duration) -> Result<Vec<String>> {
    let mut last_err = anyhow!("no dns servers configured");
    for server in servers {
        match udp_query(domain, server, RecordType::A, timeout) {
            Ok(mut ips) => {
                if ips.is_empty() {
                    if let Ok(mut v6) = udp_query(domain, server, RecordType::AAAA, timeout) {
                        ips.append(&mut v6);
                    }
                }
                ips.sort();
                ips.dedup();
                return Ok(ips);
            }
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

pub struct UdpResolver {
    servers: Vec<String>,
    timeout: Duration,
}

impl UdpResolver {
    pub fn new(servers: Vec<String>, timeout_secs: u64) -> Self {
        UdpResolver {
            servers,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    async fn system_lookup(&self, host: &str) -> (Vec<String>, Option<String>) {
        let target = format!("{}:0", host);
        match tokio::time::timeout(self.timeout, tokio::net::lookup_host(target)).await {
            Ok(Ok(addrs)) => {
                let mut ips: Vec<String> = addrs.map(|sa| sa.ip().to_string()).collect();
                ips.sort();
                ips.dedup();
                (ips, None)
            }
            Ok(Err(_)) => (Vec::new(), None), // NXDOMAIN and friends
            Err(_) => (Vec::new(), Some("dns timeout".into())),
        }
    }
}

#[async_trait]
impl Resolve for UdpResolver {
    async fn resolve(&self, host: &str) -> (Vec<String>, Option<String>) {
        if self.servers.is_empty() {
            return self.system_lookup(host).await;
        }
        let host = host.to_string();
        let servers = self.servers.clone();
        let per_query = self.timeout;
        let fut = tokio::task::spawn_blocking(move || lookup_all(&host, &servers, per_query));
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(Ok(ips))) => (ips, None),
            Ok(Ok(Err(e))) => (Vec::new(), Some(e.to_string())),
            Ok(Err(e)) => (Vec::new(), Some(format!("resolver task failed: {}", e))),
            Err(_) => (Vec::new(), Some("dns timeout".into())),
        }
    }
}

/// One line of the optional DNS transaction log.
#[derive(Serialize)]
pub struct DnsLogRecord<'a> {
    pub domain: &'a str,
    pub types: [&'static str; 2],
    pub ips: &'a [String],
    pub error: &'a str,
    pub rtt_ms: i64,
    pub request_at: i64,
}

fn random_label() -> String {
    let mut rng = rand::thread_rng();
    (0..12)
        .map(|_| {
            let c = rng.gen_range(0u8..36);
            if c < 10 {
                (b'0' + c) as char
            } else {
                (b'a' + c - 10) as char
            }
        })
        .collect()
}

/// Per-root wildcard IP sets, built once before the crawl starts and
/// read-only afterwards.
///
/// A zone that answers random nonexistent labels makes every probe under it
/// look alive; admission drops hostnames whose answers fall entirely inside
/// the recorded set.
pub struct WildcardDetector {
    sets: HashMap<String, HashSet<String>>,
}

impl WildcardDetector {
    pub fn empty() -> Self {
        WildcardDetector {
            sets: HashMap::new(),
        }
    }

    /// Probe each root with a few guaranteed-nonexistent labels and record
    /// the union of any answers.
    pub async fn detect(roots: &[String], resolver: &dyn Resolve, attempts: usize) -> Self {
        let mut sets = HashMap::new();
        for root in roots {
            let mut ips: HashSet<String> = HashSet::new();
            for _ in 0..attempts {
                let probe = format!("{}.invalid.{}", random_label(), root);
                let (answers, _) = resolver.resolve(&probe).await;
                ips.extend(answers);
            }
            if !ips.is_empty() {
                sets.insert(root.clone(), ips);
            }
        }
        WildcardDetector { sets }
    }

    pub fn has(&self, root: &str) -> bool {
        self.sets.contains_key(root)
    }

    pub fn roots_with_wildcards(&self) -> impl Iterator<Item = (&String, &HashSet<String>)> {
        self.sets.iter()
    }

    /// True when the hostname resolves and every answer lies in the root's
    /// wildcard set. Roots without a recorded set never reject.
    pub async fn rejects(&self, host: &str, root: &str, resolver: &dyn Resolve) -> bool {
        let Some(set) = self.sets.get(root) else {
            return false;
        };
        let (ips, _) = resolver.resolve(host).await;
        !ips.is_empty() && ips.iter().all(|ip| set.contains(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResolve {
        ips: Vec<String>,
    }

    #[async_trait]
    impl Resolve for StaticResolve {
        async fn resolve(&self, _host: &str) -> (Vec<String>, Option<String>) {
            (self.ips.clone(), None)
        }
    }

    #[test]
    fn query_packet_roundtrips() {
        let packet = build_query("www.example.com", RecordType::A).unwrap();
        let msg = Message::from_bytes(&packet).unwrap();
        assert_eq!(msg.queries().len(), 1);
        assert_eq!(msg.queries()[0].query_type(), RecordType::A);
        assert_eq!(msg.queries()[0].name().to_utf8(), "www.example.com.");
    }

    #[tokio::test]
    async fn wildcard_detect_records_answering_roots() {
        let resolver = StaticResolve {
            ips: vec!["1.2.3.4".into()],
        };
        let wd = WildcardDetector::detect(&["example.com".to_string()], &resolver, 3).await;
        assert!(wd.has("example.com"));
        assert!(!wd.has("other.com"));
    }

    #[tokio::test]
    async fn wildcard_rejects_subset_answers_only() {
        let mut sets = HashMap::new();
        sets.insert(
            "example.com".to_string(),
            ["1.2.3.4".to_string()].into_iter().collect::<HashSet<_>>(),
        );
        let wd = WildcardDetector { sets };

        let same = StaticResolve {
            ips: vec!["1.2.3.4".into()],
        };
        assert!(wd.rejects("x.example.com", "example.com", &same).await);

        let different = StaticResolve {
            ips: vec!["5.6.7.8".into()],
        };
        assert!(!wd.rejects("x.example.com", "example.com", &different).await);

        let empty = StaticResolve { ips: vec![] };
        assert!(!wd.rejects("x.example.com", "example.com", &empty).await);

        // unknown root never rejects
        assert!(!wd.rejects("x.other.com", "other.com", &same).await);
    }

    #[tokio::test]
    async fn no_wildcard_when_probes_stay_silent() {
        let resolver = StaticResolve { ips: vec![] };
        let wd = WildcardDetector::detect(&["example.com".to_string()], &resolver, 3).await;
        assert!(!wd.has("example.com"));
    }

    #[test]
    fn random_labels_are_plain_alnum() {
        for _ in 0..32 {
            let l = random_label();
            assert_eq!(l.len(), 12);
            assert!(l.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        }
    }
}
