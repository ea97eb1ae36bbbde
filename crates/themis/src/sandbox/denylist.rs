//! Line-level denylist applied to candidate code before it runs.
//!
//! Any line containing a denylisted substring is dropped. This is a
//! best-effort filter over raw text, trivially bypassed by string tricks;
//! the worker process boundary is what actually contains candidate code.
//! Admin templates and testcase snippets are never filtered.

/// Substrings that remove a candidate line by default
pub const DEFAULT_DENYLIST: &[&str] = &[
    "import ",
    "__import__",
    "importlib",
    "__builtins__",
    "__subclasses__",
    "__globals__",
    "exec(",
    "eval(",
    "compile(",
    "open(",
    "globals(",
    "breakpoint(",
    "subprocess",
    "os.system",
    "os.popen",
    "shutil",
    "socket",
    "ctypes",
];

pub fn default_denylist() -> Vec<String> {
    DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect()
}

/// Remove every line of `code` that contains a denylisted substring.
pub fn strip_denied_lines(code: &str, denylist: &[String]) -> String {
    let mut kept = Vec::new();
    let mut stripped = 0usize;
    for line in code.lines() {
        if denylist.iter().any(|denied| line.contains(denied.as_str())) {
            stripped += 1;
        } else {
            kept.push(line);
        }
    }
    if stripped > 0 {
        tracing::debug!(stripped, "Removed denylisted lines from candidate code");
    }
    kept.join("\n")
}
