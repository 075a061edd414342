//! Dev-server log line classification.
//!
//! Each line of server output is tested independently against two ordered
//! rule lists: "ready" rules (capture group 1 is the listening port) and
//! "error" rules. Matching is case-insensitive and searches anywhere in the
//! line unless the pattern anchors itself.

use regex::{Regex, RegexBuilder};
use tracing::trace;

/// Built-in ready rules for common dev servers.
pub const DEFAULT_READY_PATTERNS: &[&str] = &[
    r"Server listening on.*:(\d+)",
    r"Listening on.*:(\d+)",
    r"Ready on http://.*:(\d+)",
    r"Listening at.*:(\d+)",
    r"Started server on.*:(\d+)",
    r"Serving on http://.*:(\d+)",
    r"Local:\s+https?://.*:(\d+)",
];

/// Built-in error rules.
pub const DEFAULT_ERROR_PATTERNS: &[&str] = &[
    r"^ERROR",
    r"EADDRINUSE",
    r"Fatal",
    r"uncaughtException",
    r"EACCES",
];

/// Address announced by a ready line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Always `http://localhost:<port>`.
    pub url: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn localhost(port: u16) -> Self {
        Self {
            url: format!("http://localhost:{}", port),
            port,
        }
    }
}

/// Classifies server output lines as "ready" or "error".
#[derive(Debug, Clone)]
pub struct LogClassifier {
    ready: Vec<Regex>,
    error: Vec<Regex>,
}

impl Default for LogClassifier {
    fn default() -> Self {
        // The built-in tables are constant and known to compile.
        Self {
            ready: DEFAULT_READY_PATTERNS
                .iter()
                .map(|p| compile(p).expect("Invalid ready pattern"))
                .collect(),
            error: DEFAULT_ERROR_PATTERNS
                .iter()
                .map(|p| compile(p).expect("Invalid error pattern"))
                .collect(),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn compile_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| compile(p.as_ref())).collect()
}

impl LogClassifier {
    /// Creates a classifier from explicit rule lists.
    ///
    /// # Errors
    /// Returns the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(ready: &[S], error: &[S]) -> Result<Self, regex::Error> {
        Ok(Self {
            ready: compile_all(ready)?,
            error: compile_all(error)?,
        })
    }

    /// Creates a classifier where a missing or empty list means "use the
    /// built-in rules" for that side.
    pub fn from_patterns(
        ready: Option<&[String]>,
        error: Option<&[String]>,
    ) -> Result<Self, regex::Error> {
        let defaults = Self::default();
        let ready = match ready {
            Some(patterns) if !patterns.is_empty() => compile_all(patterns)?,
            _ => defaults.ready,
        };
        let error = match error {
            Some(patterns) if !patterns.is_empty() => compile_all(patterns)?,
            _ => defaults.error,
        };
        Ok(Self { ready, error })
    }

    /// Returns the announced address if `line` is a ready line.
    ///
    /// The first rule whose capture parses as a port wins.
    pub fn classify_ready(&self, line: &str) -> Option<ServerAddress> {
        self.ready.iter().find_map(|regex| {
            let caps = regex.captures(line)?;
            let port = caps.get(1)?.as_str().parse::<u16>().ok();
            if port.is_none() {
                trace!(pattern = regex.as_str(), "ready match without a usable port");
            }
            port.map(ServerAddress::localhost)
        })
    }

    /// Returns true if `line` matches any error rule.
    pub fn is_error(&self, line: &str) -> bool {
        self.error.iter().any(|regex| regex.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_node_style() {
        let classifier = LogClassifier::default();

        let addr = classifier.classify_ready("Server listening on :3000").unwrap();
        assert_eq!(addr.url, "http://localhost:3000");
        assert_eq!(addr.port, 3000);

        let addr = classifier
            .classify_ready("Ready on http://localhost:3000")
            .unwrap();
        assert_eq!(addr.port, 3000);
    }

    #[test]
    fn test_ready_rewrites_host_to_localhost() {
        let classifier = LogClassifier::default();

        let addr = classifier
            .classify_ready("Serving on http://0.0.0.0:8000")
            .unwrap();
        assert_eq!(addr, ServerAddress::localhost(8000));
    }

    #[test]
    fn test_ready_vite_and_bare_listening() {
        let classifier = LogClassifier::default();

        let addr = classifier
            .classify_ready("  ➜  Local:   http://localhost:5173/")
            .unwrap();
        assert_eq!(addr.port, 5173);

        let addr = classifier.classify_ready("Listening on :4000").unwrap();
        assert_eq!(addr.url, "http://localhost:4000");
    }

    #[test]
    fn test_ready_is_case_insensitive() {
        let classifier = LogClassifier::default();
        assert!(classifier.classify_ready("SERVER LISTENING ON 127.0.0.1:9000").is_some());
    }

    #[test]
    fn test_ready_no_match() {
        let classifier = LogClassifier::default();
        assert!(classifier.classify_ready("Building project...").is_none());
        assert!(classifier.classify_ready("").is_none());
    }

    #[test]
    fn test_ready_skips_out_of_range_port() {
        let classifier = LogClassifier::default();
        assert!(classifier.classify_ready("Listening on :99999").is_none());
    }

    #[test]
    fn test_is_error_detects_errors() {
        let classifier = LogClassifier::default();

        assert!(classifier.is_error("ERROR: Failed to start"));
        assert!(classifier.is_error("Error: EADDRINUSE"));
        assert!(classifier.is_error("Fatal: Cannot bind to port"));
        assert!(classifier.is_error("uncaughtException: Error"));
        assert!(classifier.is_error("listen EACCES: permission denied"));
    }

    #[test]
    fn test_is_error_ignores_normal_lines() {
        let classifier = LogClassifier::default();

        assert!(!classifier.is_error("Server started successfully"));
        assert!(!classifier.is_error("Listening on port 3000"));
        // ^ERROR is anchored
        assert!(!classifier.is_error("no error here"));
    }

    #[test]
    fn test_custom_patterns() {
        let classifier =
            LogClassifier::new(&[r"Custom server ready on :(\d+)"], &[r"CUSTOM_ERROR"]).unwrap();

        let addr = classifier
            .classify_ready("Custom server ready on :4000")
            .unwrap();
        assert_eq!(addr.url, "http://localhost:4000");
        assert!(classifier.is_error("CUSTOM_ERROR: Something went wrong"));

        // Custom lists replace the defaults.
        assert!(classifier.classify_ready("Server listening on :3000").is_none());
        assert!(!classifier.is_error("Fatal: boom"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let result = LogClassifier::new(&[r"(unclosed"], &[r"ok"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_patterns_falls_back_per_side() {
        let custom_error = vec!["BOOM".to_string()];
        let classifier = LogClassifier::from_patterns(Some(&[][..]), Some(custom_error.as_slice())).unwrap();

        assert!(classifier.classify_ready("Listening on :4000").is_some());
        assert!(classifier.is_error("boom happened"));
        assert!(!classifier.is_error("EADDRINUSE"));

        let classifier = LogClassifier::from_patterns(None, None).unwrap();
        assert!(classifier.is_error("EADDRINUSE"));
    }
}
