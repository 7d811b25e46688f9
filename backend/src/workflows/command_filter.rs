// Command Safety Filter - gatekeeper for run_command actions
//
// A text filter, not a shell parser: a command is rejected if it matches any
// forbidden pattern, then must start with an allow-listed prefix.

use regex::RegexSet;
use serde::Serialize;
use std::sync::LazyLock;

pub const FORBIDDEN_PATTERN_ERROR: &str = "Command contains forbidden pattern";
pub const NOT_ALLOWED_ERROR: &str = "Command not in allowed list";

static FORBIDDEN_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // Destructive filesystem operations
        r"(?i)\brm\s+-[a-z]*[rf]",
        r"(?i)\brmdir\b",
        r"(?i)\bmkfs",
        r"(?i)\bdd\s+if=",
        r"(?i)(of=|>\s*)/dev/",
        r"(?i)\bchmod\s+(-[a-z]+\s+)*0?777\b",
        // Privilege escalation
        r"(?i)\bsudo\b",
        r"(?i)(^|\s)su(\s|$)",
        // Dynamic evaluation
        r"(?i)\beval\b",
        r"(?i)\bexec\b",
        r"\$\(",
        r"`",
        // Chaining, piping, redirection
        r"&&",
        r"\|\|",
        r";",
        r"\|",
        r">>",
        r">",
        r"<",
    ])
    .expect("forbidden command patterns are valid regexes")
});

/// Literal prefixes a lower-cased, trimmed command must start with
pub const ALLOWED_PREFIXES: &[&str] = &[
    "openclaw",
    "git status",
    "git log",
    "ls",
    "pwd",
    "date",
    "echo",
    "cat",
    "head",
    "tail",
    "wc",
    "curl",
    "wget",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandCheck {
    fn allowed() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn rejected(error: &str) -> Self {
        Self {
            valid: false,
            error: Some(error.to_string()),
        }
    }
}

pub fn validate_command(command: &str) -> CommandCheck {
    if FORBIDDEN_PATTERNS.is_match(command) {
        return CommandCheck::rejected(FORBIDDEN_PATTERN_ERROR);
    }

    let normalized = command.trim().to_lowercase();
    if ALLOWED_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
    {
        CommandCheck::allowed()
    } else {
        CommandCheck::rejected(NOT_ALLOWED_ERROR)
    }
}

/// Token-exact form of the allow list: the program (and for `git` the
/// subcommand) must equal the words of one entry, so `lscpu` or `git push`
/// do not ride on the `ls` and `git status` prefixes.
pub fn is_allowed_program(command: &str) -> bool {
    let normalized = command.trim().to_lowercase();
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    ALLOWED_PREFIXES.iter().any(|prefix| {
        let words: Vec<&str> = prefix.split_whitespace().collect();
        tokens.len() >= words.len() && tokens.iter().zip(&words).all(|(token, word)| token == word)
    })
}
