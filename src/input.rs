//! Seed list loading: one hostname per line, `#` comments and blanks
//! skipped, `-` for stdin.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};

pub fn read_seeds(path: &str) -> Result<Vec<String>> {
    if path == "-" {
        read_from(std::io::stdin().lock())
    } else {
        let f = File::open(path).with_context(|| format!("open seed file {}", path))?;
        read_from(BufReader::new(f))
    }
}

fn read_from<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut seeds = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line.context("read seed line")?;
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        seeds.push(s.to_string());
    }
    Ok(seeds)
}
