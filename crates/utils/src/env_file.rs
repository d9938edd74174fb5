//! Reading and writing `KEY=value` files consumed as container env files.
//!
//! Only lines of the form `KEY=value` with an uppercase identifier key are
//! recognised; comments, blank lines and anything else are skipped. Values
//! are taken verbatim up to the end of the line.

use std::fmt::Write as _;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                is_env_key(key).then(|| (key.to_string(), value.to_string()))
            })
            .collect();
        Self { entries }
    }

    /// Value of the last assignment to `key`, as a shell would see it.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`EnvFile::get`] but treats `KEY=` as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Builds the text of an env file line by line.
#[derive(Debug, Clone)]
pub struct EnvFileWriter {
    out: String,
}

impl EnvFileWriter {
    pub fn with_header(comment: &str) -> Self {
        let mut out = String::new();
        let _ = writeln!(out, "# {}", comment);
        Self { out }
    }

    pub fn set(mut self, key: &str, value: impl AsRef<str>) -> Self {
        // Values end at the newline on the way back in, so strip them here.
        let value: String = value
            .as_ref()
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .collect();
        let _ = writeln!(self.out, "{}={}", key, value);
        self
    }

    pub fn set_if_present(self, key: &str, value: Option<&str>) -> Self {
        match value.filter(|v| !v.is_empty()) {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}
