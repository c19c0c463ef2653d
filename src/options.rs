use anyhow::{bail, Result};
use std::path::PathBuf;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/114.0";

/// Validated run configuration, assembled from the CLI.
#[derive(Debug, Clone)]
pub struct Options {
    /// Seed list path, `-` for stdin.
    pub input: String,
    /// Result JSONL path, `-` for stdout.
    pub output: String,
    pub workers: usize,
    /// 0 means auto (`workers * 10`).
    pub queue_size: usize,
    pub max_depth: i32,
    /// Composite per-fetch deadline, seconds.
    pub http_timeout: u64,
    /// Body read cap, bytes.
    pub max_response_size: u64,
    /// Per-resolve deadline, seconds.
    pub dns_timeout: u64,
    pub bloom_size: usize,
    pub bloom_fp: f64,
    pub bloom_file: Option<PathBuf>,
    pub expand_sld: bool,
    pub user_agent: String,
    /// Schemes tried in order for each task.
    pub protocols: Vec<String>,
    /// DNS servers (`ip` or `ip:port`); empty means system resolver.
    pub resolvers: Vec<String>,
    pub http_log: Option<PathBuf>,
    pub dns_log: Option<PathBuf>,
    pub gzip: bool,
    pub progress: bool,
    pub progress_interval: u64,
    pub silent: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            input: "-".into(),
            output: "-".into(),
            workers: 32,
            queue_size: 0,
            max_depth: 2,
            http_timeout: 10,
            max_response_size: 10 * 1024 * 1024,
            dns_timeout: 5,
            bloom_size: 1_048_576,
            bloom_fp: 0.01,
            bloom_file: None,
            expand_sld: true,
            user_agent: DEFAULT_USER_AGENT.into(),
            protocols: vec!["https".into(), "http".into()],
            resolvers: default_resolvers(),
            http_log: None,
            dns_log: None,
            gzip: false,
            progress: true,
            progress_interval: 1,
            silent: false,
        }
    }
}

impl Options {
    /// Validate everything a run depends on; all failures here are fatal
    /// startup errors.
    pub fn check(&mut self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.max_depth < 0 {
            bail!("max-depth must be >= 0");
        }
        if self.http_timeout == 0 || self.dns_timeout == 0 {
            bail!("timeouts must be positive");
        }
        if self.max_response_size == 0 {
            bail!("max-response-size must be positive");
        }
        if !(self.bloom_fp > 0.0 && self.bloom_fp < 1.0) {
            bail!("bloom-fp must be in (0, 1), got {}", self.bloom_fp);
        }
        if self.bloom_size == 0 {
            bail!("bloom-size must be positive");
        }
        if self.protocols.is_empty() {
            bail!("at least one protocol is required");
        }
        for p in &self.protocols {
            if p != "http" && p != "https" {
                bail!("unsupported protocol: {}", p);
            }
        }
        if self.output != "-" && self.output.ends_with(".gz") {
            self.gzip = true;
        }
        if self.output == "-" && self.gzip {
            bail!("gzip output requires a file path");
        }
        Ok(())
    }

    pub fn queue_capacity(&self) -> usize {
        if self.queue_size > 0 {
            self.queue_size
        } else {
            self.workers.saturating_mul(10).max(1)
        }
    }
}

pub fn default_resolvers() -> Vec<String> {
    vec![
        "8.8.8.8".to_string(),
        "8.8.4.4".to_string(),
        "1.1.1.1".to_string(),
        "1.0.0.1".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_check() {
        let mut opt = Options::default();
        assert!(opt.check().is_ok());
        assert_eq!(opt.queue_capacity(), 320);
    }

    #[test]
    fn queue_capacity_override() {
        let opt = Options {
            queue_size: 10_000,
            ..Options::default()
        };
        assert_eq!(opt.queue_capacity(), 10_000);
    }

    #[test]
    fn rejects_bad_config() {
        let mut opt = Options {
            workers: 0,
            ..Options::default()
        };
        assert!(opt.check().is_err());

        let mut opt = Options {
            bloom_fp: 1.5,
            ..Options::default()
        };
        assert!(opt.check().is_err());

        let mut opt = Options {
            protocols: vec!["gopher".into()],
            ..Options::default()
        };
        assert!(opt.check().is_err());
    }

    #[test]
    fn gz_suffix_implies_gzip() {
        let mut opt = Options {
            output: "results.jsonl.gz".into(),
            ..Options::default()
        };
        opt.check().unwrap();
        assert!(opt.gzip);
    }
}
