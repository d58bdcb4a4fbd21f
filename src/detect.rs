//! LLM CLI command detection.
//!
//! A pure, side-effect-free classifier over a single trimmed command line.
//! The registry below is the single source of truth for what counts as an
//! LLM command; no other module hard-codes a provider name.

use regex::Regex;
use std::sync::OnceLock;

/// Closed set of recognized LLM CLI providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// GitHub Copilot CLI (`copilot`, `gh copilot ...`).
    GithubCopilot,
    /// Claude CLI (`claude`).
    Claude,
    /// Aider (`aider`).
    Aider,
    /// No registry entry matched.
    Unknown,
}

impl Provider {
    /// Stable wire identifier, used at the HTTP boundary.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GithubCopilot => "github-copilot",
            Self::Claude => "claude",
            Self::Aider => "aider",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the wire identifier back into a `Provider`, for the
    /// explicit-trigger HTTP path where the caller supplies the provider
    /// directly.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "github-copilot" => Self::GithubCopilot,
            "claude" => Self::Claude,
            "aider" => Self::Aider,
            _ => Self::Unknown,
        }
    }
}

/// Closed set of command kinds a detected invocation can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Open-ended chat/conversation invocation.
    Chat,
    /// Code suggestion invocation (`gh copilot suggest`).
    Suggest,
    /// Explanation invocation (`gh copilot explain`).
    Explain,
    /// Direct code-editing invocation.
    Code,
}

impl CommandKind {
    /// Stable wire identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Suggest => "suggest",
            Self::Explain => "explain",
            Self::Code => "code",
        }
    }
}

/// The outcome of classifying one command line.
#[derive(Debug, Clone)]
pub struct Detected {
    /// Provider recognized, or `Unknown` if no entry matched.
    pub provider: Provider,
    /// Command kind, meaningless when `detected` is false.
    pub kind: CommandKind,
    /// Extracted prompt text, if the matching entry captured one.
    pub prompt: String,
    /// The raw input line that was classified.
    pub raw_input: String,
    /// Whether any registry entry matched.
    pub detected: bool,
}

impl Detected {
    fn unknown(raw_input: &str) -> Self {
        Self {
            provider: Provider::Unknown,
            kind: CommandKind::Chat,
            prompt: String::new(),
            raw_input: raw_input.to_string(),
            detected: false,
        }
    }
}

struct Entry {
    name: &'static str,
    pattern: &'static str,
    provider: Provider,
    kind: CommandKind,
}

/// Ordered registry. Entries are tried top-to-bottom; the first match wins,
/// so order encodes priority (exact invocation before path-tail, path-tail
/// before compound `gh copilot ...` forms).
const ENTRIES: &[Entry] = &[
    Entry {
        name: "copilot-exact",
        pattern: r"^copilot(\s|$)",
        provider: Provider::GithubCopilot,
        kind: CommandKind::Chat,
    },
    Entry {
        name: "claude-exact",
        pattern: r"^claude(\s|$)",
        provider: Provider::Claude,
        kind: CommandKind::Chat,
    },
    Entry {
        name: "aider-exact",
        pattern: r"^aider(\s|$)",
        provider: Provider::Aider,
        kind: CommandKind::Chat,
    },
    Entry {
        name: "copilot-path-tail",
        pattern: r"(?i)/copilot(\s|$)",
        provider: Provider::GithubCopilot,
        kind: CommandKind::Chat,
    },
    Entry {
        name: "claude-path-tail",
        pattern: r"(?i)/claude(\s|$)",
        provider: Provider::Claude,
        kind: CommandKind::Chat,
    },
    Entry {
        name: "aider-path-tail",
        pattern: r"(?i)/aider(\s|$)",
        provider: Provider::Aider,
        kind: CommandKind::Chat,
    },
    Entry {
        name: "gh-copilot-suggest",
        pattern: r"^gh\s+copilot\s+suggest(\s|$)",
        provider: Provider::GithubCopilot,
        kind: CommandKind::Suggest,
    },
    Entry {
        name: "gh-copilot-explain",
        pattern: r"^gh\s+copilot\s+explain(\s|$)",
        provider: Provider::GithubCopilot,
        kind: CommandKind::Explain,
    },
    Entry {
        name: "gh-copilot-chat",
        pattern: r"^gh\s+copilot\s+chat(\s|$)",
        provider: Provider::GithubCopilot,
        kind: CommandKind::Chat,
    },
];

struct CompiledEntry {
    #[allow(dead_code, reason = "kept for debugging registry mismatches")]
    name: &'static str,
    regex: Regex,
    provider: Provider,
    kind: CommandKind,
}

fn compiled_registry() -> &'static [CompiledEntry] {
    static REGISTRY: OnceLock<Vec<CompiledEntry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        ENTRIES
            .iter()
            .map(|e| CompiledEntry {
                name: e.name,
                regex: Regex::new(e.pattern).expect("registry pattern must compile"),
                provider: e.provider,
                kind: e.kind,
            })
            .collect()
    })
}

/// Extract any trailing quoted text from a compound `gh copilot ...`
/// invocation, for use as the conversation's initial prompt.
fn extract_quoted_prompt(line: &str) -> String {
    static QUOTE_RE: OnceLock<Regex> = OnceLock::new();
    let re = QUOTE_RE.get_or_init(|| Regex::new(r#"["']([^"']*)["']\s*$"#).expect("valid regex"));
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Classify a trimmed command line.
///
/// Pure function: depends only on `line`. Leading/trailing whitespace is
/// trimmed before matching, so `detect(x.trim()) == detect(x)`.
#[must_use]
pub fn detect(line: &str) -> Detected {
    let trimmed = line.trim();
    for entry in compiled_registry() {
        if entry.regex.is_match(trimmed) {
            let prompt = extract_quoted_prompt(trimmed);
            return Detected {
                provider: entry.provider,
                kind: entry.kind,
                prompt,
                raw_input: trimmed.to_string(),
                detected: true,
            };
        }
    }
    Detected::unknown(trimmed)
}

/// Best-effort keyword match used by the explicit HTTP trigger path when no
/// `llmProvider` field is supplied: scans `content` for a provider name
/// rather than anchoring to the start of a command line.
#[must_use]
pub fn keyword_match(content: &str) -> Provider {
    let lower = content.to_lowercase();
    if lower.contains("copilot") {
        Provider::GithubCopilot
    } else if lower.contains("claude") {
        Provider::Claude
    } else if lower.contains("aider") {
        Provider::Aider
    } else {
        Provider::Unknown
    }
}
