//! Result and transaction-log writers.
//!
//! The sink task is the only caller of `ResultWriter::write`, so the mutex
//! inside each writer only matters for the log writers, which workers hit
//! concurrently.

use crate::queue::CrawlResult;
use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

pub trait ResultWriter: Send + Sync {
    fn write(&self, r: &CrawlResult) -> Result<()>;
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// One JSON object per line, flushed per line, to a file, stdout or a
/// gzip-compressed file.
pub struct JsonLinesWriter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesWriter {
    pub fn create(path: &str, gzip: bool) -> Result<Self> {
        let out: Box<dyn Write + Send> = if path == "-" {
            Box::new(std::io::stdout())
        } else {
            let f = File::create(path).with_context(|| format!("open output file {}", path))?;
            if gzip {
                Box::new(GzEncoder::new(f, Compression::default()))
            } else {
                Box::new(BufWriter::new(f))
            }
        };
        Ok(JsonLinesWriter {
            out: Mutex::new(out),
        })
    }
}

impl ResultWriter for JsonLinesWriter {
    fn write(&self, r: &CrawlResult) -> Result<()> {
        let line = serde_json::to_string(r)?;
        let mut guard = self.out.lock().unwrap();
        writeln!(guard, "{}", line)?;
        guard.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // gzip trailer is finished when the encoder drops
        self.out.lock().unwrap().flush()?;
        Ok(())
    }
}

/// Shared JSONL stream for the optional HTTP/DNS transaction logs.
pub struct JsonlWriter {
    out: Mutex<BufWriter<File>>,
}

impl JsonlWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let f = File::create(path).with_context(|| format!("open log file {}", path.display()))?;
        Ok(JsonlWriter {
            out: Mutex::new(BufWriter::new(f)),
        })
    }

    pub fn log<T: Serialize>(&self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut guard = self.out.lock().unwrap();
        writeln!(guard, "{}", line)?;
        guard.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CrawlResult;

    fn sample() -> CrawlResult {
        CrawlResult {
            domain: "www.example.com".into(),
            root: "example.com".into(),
            subdomains: vec!["api.example.com".into()],
            ips: vec!["93.184.216.34".into()],
            title: "Example".into(),
            content_length: 1256,
            status_code: 200,
            error: String::new(),
        }
    }

    #[test]
    fn writes_stable_field_order() {
        let line = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            line,
            r#"{"domain":"www.example.com","root":"example.com","subdomains":["api.example.com"],"ips":["93.184.216.34"],"title":"Example","content_length":1256,"status_code":200,"error":""}"#
        );
    }

    #[test]
    fn arrays_are_never_null() {
        let r = CrawlResult {
            subdomains: Vec::new(),
            ips: Vec::new(),
            ..sample()
        };
        let line = serde_json::to_string(&r).unwrap();
        assert!(line.contains(r#""subdomains":[]"#));
        assert!(line.contains(r#""ips":[]"#));
    }

    #[test]
    fn file_roundtrip() {
        let path = std::env::temp_dir().join("rucrawl_out_rt.jsonl");
        let _ = std::fs::remove_file(&path);
        let w = JsonLinesWriter::create(path.to_str().unwrap(), false).unwrap();
        w.write(&sample()).unwrap();
        w.write(&sample()).unwrap();
        w.close().unwrap();
        let data = std::fs::read_to_string(&path).unwrap();
        assert_eq!(data.lines().count(), 2);
        for line in data.lines() {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(v["domain"], "www.example.com");
        }
        let _ = std::fs::remove_file(&path);
    }
}
