use crate::options::{default_resolvers, Options, DEFAULT_USER_AGENT};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "rucrawl - recursive HTTP subdomain crawler",
    long_about = "Fetches each candidate hostname over HTTPS/HTTP, extracts every \
domain-like token from bodies and headers, keeps the ones under a configured \
root, resolves them for enrichment, and feeds new hostnames back into the \
crawl until the frontier is exhausted.\n\n\
Examples:\n  \
rucrawl -i roots.txt -o results.jsonl\n  \
echo tsinghua.edu.cn | rucrawl -i - -o - --max-depth 1 --workers 64"
)]
pub struct Cli {
    /// Seed file, one hostname per line ('-' for stdin; '#' starts a comment)
    #[arg(short = 'i', long = "input", default_value = "-")]
    pub input: String,

    /// Result JSONL file ('-' for stdout; a .gz suffix enables compression)
    #[arg(short = 'o', long = "output", default_value = "-")]
    pub output: String,

    /// Number of concurrent crawl workers
    #[arg(short = 'w', long = "workers", default_value_t = 32)]
    pub workers: usize,

    /// Task queue capacity (0 = workers * 10)
    #[arg(long = "queue-size", default_value_t = 0)]
    pub queue_size: usize,

    /// Largest subdomain depth relative to the root that may be crawled
    #[arg(long = "max-depth", default_value_t = 2)]
    pub max_depth: i32,

    /// Per-fetch deadline in seconds (dial + TLS + headers + body)
    #[arg(long = "http-timeout", default_value_t = 10)]
    pub http_timeout: u64,

    /// Response body read cap in bytes
    #[arg(long = "max-response-size", default_value_t = 10 * 1024 * 1024)]
    pub max_response_size: u64,

    /// Per-resolve deadline in seconds
    #[arg(long = "dns-timeout", default_value_t = 5)]
    pub dns_timeout: u64,

    /// Expected number of distinct hostnames (dedup filter sizing)
    #[arg(long = "bloom-size", default_value_t = 1_048_576)]
    pub bloom_size: usize,

    /// Dedup filter false-positive rate
    #[arg(long = "bloom-fp", default_value_t = 0.01)]
    pub bloom_fp: f64,

    /// Persist the dedup filter here; an existing file is loaded on startup
    #[arg(long = "bloom-file")]
    pub bloom_file: Option<PathBuf>,

    /// Do not expand bare registrable domains with common prefixes
    #[arg(long = "no-expand-sld")]
    pub no_expand_sld: bool,

    /// HTTP User-Agent
    #[arg(long = "user-agent", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Schemes to try in order, comma separated
    #[arg(long = "protocols", default_value = "https,http", value_delimiter = ',')]
    pub protocols: Vec<String>,

    /// DNS servers, repeatable (default: public resolvers; use ip or ip:port)
    #[arg(short = 'r', long = "resolver")]
    pub resolvers: Vec<String>,

    /// Write one JSONL record per HTTP transaction here
    #[arg(long = "http-log")]
    pub http_log: Option<PathBuf>,

    /// Write one JSONL record per DNS query here
    #[arg(long = "dns-log")]
    pub dns_log: Option<PathBuf>,

    /// Force gzip compression of the result file
    #[arg(long = "gzip")]
    pub gzip: bool,

    /// Disable the stderr progress line
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Progress refresh interval in seconds
    #[arg(long = "progress-interval", default_value_t = 1)]
    pub progress_interval: u64,

    /// Suppress all diagnostics except errors
    #[arg(short = 'q', long = "silent")]
    pub silent: bool,
}

impl Cli {
    pub fn into_options(self) -> Options {
        let resolvers = if self.resolvers.is_empty() {
            default_resolvers()
        } else {
            self.resolvers
        };
        Options {
            input: self.input,
            output: self.output,
            workers: self.workers,
            queue_size: self.queue_size,
            max_depth: self.max_depth,
            http_timeout: self.http_timeout,
            max_response_size: self.max_response_size,
            dns_timeout: self.dns_timeout,
            bloom_size: self.bloom_size,
            bloom_fp: self.bloom_fp,
            bloom_file: self.bloom_file,
            expand_sld: !self.no_expand_sld,
            user_agent: self.user_agent,
            protocols: self.protocols,
            resolvers,
            http_log: self.http_log,
            dns_log: self.dns_log,
            gzip: self.gzip,
            progress: !self.no_progress && !self.silent,
            progress_interval: self.progress_interval,
            silent: self.silent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let cli = Cli::parse_from(["rucrawl"]);
        let opt = cli.into_options();
        assert_eq!(opt.input, "-");
        assert_eq!(opt.workers, 32);
        assert_eq!(opt.protocols, vec!["https", "http"]);
        assert!(opt.expand_sld);
        assert_eq!(opt.resolvers.len(), 4);
    }

    #[test]
    fn parses_full_invocation() {
        let cli = Cli::parse_from([
            "rucrawl",
            "-i",
            "roots.txt",
            "-o",
            "out.jsonl",
            "--workers",
            "64",
            "--max-depth",
            "1",
            "--protocols",
            "http",
            "--no-expand-sld",
            "-r",
            "9.9.9.9",
        ]);
        let opt = cli.into_options();
        assert_eq!(opt.workers, 64);
        assert_eq!(opt.max_depth, 1);
        assert_eq!(opt.protocols, vec!["http"]);
        assert!(!opt.expand_sld);
        assert_eq!(opt.resolvers, vec!["9.9.9.9"]);
    }
}
