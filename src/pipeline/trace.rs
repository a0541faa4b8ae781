use std::path::{Path, PathBuf};

use anyhow::Context;

/// Dumps prompts and raw backend output per unit and attempt when enabled.
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    /// `chunk_000003.attempt1.prompt.txt` and friends.
    pub fn write_unit_text(
        &self,
        unit: &str,
        index: usize,
        attempt: usize,
        kind: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let name = format!("{unit}_{index:06}.attempt{attempt}.{kind}.txt");
        self.write_named_text(&name, text)
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_unit_files_when_enabled() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let trace = TraceWriter::new(tmp.path().join("trace"), true).expect("trace");
        trace
            .write_unit_text("section", 2, 1, "prompt", "hello")
            .expect("write");
        let path = trace.dir().join("section_000002.attempt1.prompt.txt");
        assert_eq!(std::fs::read_to_string(path).expect("read"), "hello");
        trace.write_named_text("a/b:c.txt", "x").expect("write");
        assert!(trace.dir().join("a_b_c.txt").exists());
    }

    #[test]
    fn disabled_writer_is_silent() {
        let trace = TraceWriter::disabled();
        assert!(!trace.is_enabled());
        trace.write_named_text("x.txt", "y").expect("noop");
    }
}
