use std::io::{self, Write};
use std::time::Instant;

/// User-facing progress lines on stderr; independent of the `tracing` log level.
#[derive(Clone, Debug)]
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::disabled()
    }
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        self.emit(msg.as_ref());
    }

    pub fn progress(&self, label: &str, current: usize, total: usize) {
        if !self.enabled {
            return;
        }
        self.emit(&progress_line(label, current, total));
    }

    /// One finished chunk or section, with how hard it was to get.
    pub fn unit_finished(&self, unit: &str, current: usize, total: usize, attempts: usize, score: f64) {
        if !self.enabled {
            return;
        }
        let line = progress_line(unit, current, total);
        self.emit(&format!("{line} attempts={attempts} score={score:.2}"));
    }

    fn emit(&self, line: &str) {
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {line}");
    }
}

fn progress_line(label: &str, current: usize, total: usize) -> String {
    let total = total.max(1);
    let current = current.min(total);
    let pct = (current as f64 / total as f64) * 100.0;
    format!("{label} {current}/{total} ({pct:5.1}%)")
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_format() {
        assert_eq!(fmt_elapsed(0.0), "00:00");
        assert_eq!(fmt_elapsed(75.9), "01:15");
        assert_eq!(fmt_elapsed(3723.0), "01:02:03");
        assert_eq!(fmt_elapsed(-4.0), "00:00");
    }

    #[test]
    fn progress_line_clamps() {
        assert_eq!(progress_line("chunk", 1, 4), "chunk 1/4 ( 25.0%)");
        assert_eq!(progress_line("section", 9, 3), "section 3/3 (100.0%)");
        assert_eq!(progress_line("plan", 0, 0), "plan 0/1 (  0.0%)");
    }
}
