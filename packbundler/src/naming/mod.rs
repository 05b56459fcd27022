//! Extracts the produced archive's filename from captured pack output.
//!
//! Pack output is noisy: progress notices, colour codes, carriage-return
//! redraws. The parser strips terminal escapes first and then looks for the
//! filename in decreasing order of confidence:
//!
//! 1. an explicit `filename: <name>.tgz` notice
//! 2. a line consisting solely of a `.tgz` token
//! 3. the last `.tgz` token anywhere in the text
//!
//! Finding nothing is a normal outcome and yields `None`.

use regex::Regex;
use std::sync::LazyLock;

/// Extension of the archives produced by the pack step.
pub const ARCHIVE_EXTENSION: &str = "tgz";

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B\[[0-9;]*[A-Za-z]").unwrap_or_else(|e| unreachable!("{e}"))
});

static FILENAME_NOTICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)filename:\s*(\S+\.tgz)").unwrap_or_else(|e| unreachable!("{e}"))
});

static STANDALONE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(\S+\.tgz)\s*$").unwrap_or_else(|e| unreachable!("{e}"))
});

static ANY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\S+\.tgz)").unwrap_or_else(|e| unreachable!("{e}")));

/// Removes ANSI CSI sequences and carriage returns.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").replace('\r', "")
}

/// Returns the archive filename named in `captured_stdout`, if any.
#[must_use]
pub fn parse_artifact_name(captured_stdout: &str) -> Option<String> {
    let out = strip_ansi(captured_stdout);

    if let Some(caps) = FILENAME_NOTICE.captures(&out) {
        return Some(caps[1].to_string());
    }

    if let Some(caps) = STANDALONE_LINE.captures(&out) {
        return Some(caps[1].to_string());
    }

    ANY_TOKEN
        .captures_iter(&out)
        .last()
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_notice() {
        assert_eq!(
            parse_artifact_name("npm notice filename: foo-1.2.3.tgz\n..."),
            Some("foo-1.2.3.tgz".to_string())
        );
    }

    #[test]
    fn test_no_tarball_info() {
        assert_eq!(parse_artifact_name("no tarball info here"), None);
        assert_eq!(parse_artifact_name(""), None);
    }

    #[test]
    fn test_strips_ansi_before_matching() {
        let out = "npm notice\n\u{1B}[32mfoo-1.0.0.tgz\u{1B}[0m\n";
        assert_eq!(parse_artifact_name(out), Some("foo-1.0.0.tgz".to_string()));
    }

    #[test]
    fn test_strips_carriage_returns() {
        let out = "packing...\r\nleft-pad-1.3.0.tgz\r\n";
        assert_eq!(parse_artifact_name(out), Some("left-pad-1.3.0.tgz".to_string()));
    }

    #[test]
    fn test_notice_beats_standalone_line() {
        let out = "other-0.0.1.tgz\nnpm notice filename: real-2.0.0.tgz\n";
        assert_eq!(parse_artifact_name(out), Some("real-2.0.0.tgz".to_string()));
    }

    #[test]
    fn test_notice_is_case_insensitive_and_coloured() {
        let out = "\u{1B}[1mnpm\u{1B}[22m notice Filename:   scope-pkg-2.0.0.tgz\n";
        assert_eq!(parse_artifact_name(out), Some("scope-pkg-2.0.0.tgz".to_string()));
    }

    #[test]
    fn test_standalone_beats_inline_token() {
        let out = "wrote tmp/inline-1.0.0.tgz to cache\n  standalone-1.0.0.tgz  \n";
        assert_eq!(parse_artifact_name(out), Some("standalone-1.0.0.tgz".to_string()));
    }

    #[test]
    fn test_last_inline_token_wins() {
        let out = "moved first-1.0.0.tgz => second-1.0.0.tgz done";
        assert_eq!(parse_artifact_name(out), Some("second-1.0.0.tgz".to_string()));
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\u{1B}[31;1mred\u{1B}[0m\r"), "red");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
