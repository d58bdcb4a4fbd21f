//! Raw terminal bytes → clean text.
//!
//! A pure transform pipeline, deterministic and idempotent
//! (`sanitize(sanitize(x)) == sanitize(x)`). Never panics: malformed input
//! produces whatever cleaning is possible rather than an error.

use std::sync::OnceLock;

/// Footer lines Copilot CLI prints that carry no conversational content.
const COPILOT_FOOTER_SUBSTRINGS: &[&str] = &[
    "Ctrl+c Exit",
    "Remaining requests:",
    "Confirm with number keys",
];

const BOX_DRAWING_CHARS: &[char] = &[
    '\u{2500}', '\u{2502}', '\u{250c}', '\u{2510}', '\u{2514}', '\u{2518}', '\u{251c}', '\u{2524}',
    '\u{252c}', '\u{2534}', '\u{253c}', '\u{2550}', '\u{2551}', '\u{2554}', '\u{2557}', '\u{255a}',
    '\u{255d}',
];

/// Strip OSC/other non-CSI control sequences, surfacing any embedded
/// notification text as a plain `[notify] <text>` line rather than
/// silently discarding it — the same OSC-9/OSC-777 shapes the PTY layer
/// already recognizes for desktop notifications.
fn strip_osc_and_other_controls(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b == 0x1b && input.get(i + 1) == Some(&b']') {
            let start = i + 2;
            let mut end = None;
            let mut j = start;
            while j < input.len() {
                if input[j] == 0x07 {
                    end = Some(j);
                    break;
                }
                if input[j] == 0x1b && input.get(j + 1) == Some(&b'\\') {
                    end = Some(j);
                    break;
                }
                j += 1;
            }
            if let Some(end) = end {
                let content = String::from_utf8_lossy(&input[start..end]);
                if let Some(rest) = content.strip_prefix("9;") {
                    if !rest.is_empty() {
                        out.extend_from_slice(b"[notify] ");
                        out.extend_from_slice(rest.as_bytes());
                        out.push(b'\n');
                    }
                } else if let Some(rest) = content.strip_prefix("777;notify;") {
                    let mut parts = rest.splitn(2, ';');
                    let title = parts.next().unwrap_or("");
                    let body = parts.next().unwrap_or("");
                    if !title.is_empty() || !body.is_empty() {
                        out.extend_from_slice(b"[notify] ");
                        out.extend_from_slice(title.as_bytes());
                        if !body.is_empty() {
                            out.push(b' ');
                            out.extend_from_slice(body.as_bytes());
                        }
                        out.push(b'\n');
                    }
                }
                i = end + 1;
                continue;
            }
        }
        // Any other ESC-introduced sequence we don't specifically decode
        // (e.g. charset selection `ESC ( B`, single-shift codes) loses
        // only the ESC byte itself; trailing plain bytes pass through.
        if b == 0x1b {
            i += 1;
            continue;
        }
        out.push(b);
        i += 1;
    }
    out
}

/// Remove CSI sequences (`ESC [ ... letter`), including DEC private-mode
/// forms (`ESC [ ? ... letter`) and bracketed-paste markers. Also handles
/// orphaned fragments where the leading `ESC` byte was already lost
/// upstream, leaving a bare `[?...letter` or `[...letter` run.
fn strip_csi(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == 0x1b && input.get(i + 1) == Some(&b'[') {
            i += 2;
            while i < input.len() && !input[i].is_ascii_alphabetic() {
                i += 1;
            }
            if i < input.len() {
                i += 1; // consume final letter
            }
            continue;
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

/// Second pass over text (post-ESC-stripping) that removes orphaned CSI
/// fragments whose leading `ESC` byte is already gone, e.g. a bare
/// `[?2004h` left behind by an upstream stage.
fn strip_orphaned_csi_fragments(text: &str) -> String {
    static ORPHAN_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ORPHAN_RE.get_or_init(|| {
        regex::Regex::new(r"\[(?:\?[0-9;]*|[0-9;]+)[a-zA-Z]").expect("valid orphan-fragment regex")
    });
    re.replace_all(text, "").into_owned()
}

/// Drop non-printable bytes except newline, tab, carriage-return.
fn drop_non_printable(input: &[u8]) -> Vec<u8> {
    input
        .iter()
        .copied()
        .filter(|&b| b == b'\n' || b == b'\t' || b == b'\r' || !(b < 0x20 || b == 0x7f))
        .collect()
}

/// Strip box-drawing glyphs used by TUI frame chrome.
fn strip_box_drawing(text: &str) -> String {
    text.chars().filter(|c| !BOX_DRAWING_CHARS.contains(c)).collect()
}

/// Elide Copilot-CLI footer lines.
fn elide_provider_footers(text: &str) -> String {
    text.lines()
        .filter(|line| {
            !COPILOT_FOOTER_SUBSTRINGS
                .iter()
                .any(|footer| line.contains(footer))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of 3+ blank lines to exactly two, trim outer whitespace.
fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                out.push('\n');
            }
        } else {
            blank_run = 0;
            out.push_str(line);
            out.push('\n');
        }
    }
    out.trim().to_string()
}

/// Convert raw terminal output bytes into clean, storage-ready text.
///
/// Pipeline order matters: CSI stripping and bracketed-paste markers are
/// handled first (they're the highest-volume noise), then OSC/notification
/// handling, then byte-level filtering, then the text-level glyph and
/// footer passes, then whitespace normalization.
#[must_use]
pub fn sanitize(raw: &[u8]) -> String {
    let no_csi = strip_csi(raw);
    let no_osc = strip_osc_and_other_controls(&no_csi);
    let printable = drop_non_printable(&no_osc);
    let text = String::from_utf8_lossy(&printable).into_owned();
    let text = strip_orphaned_csi_fragments(&text);
    let text = strip_box_drawing(&text);
    let text = elide_provider_footers(&text);
    collapse_blank_runs(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csi_sequences() {
        let raw = b"\x1b[31mhello\x1b[0m world";
        assert_eq!(sanitize(raw), "hello world");
    }

    #[test]
    fn strips_dec_private_mode_csi() {
        let raw = b"before\x1b[?2004hafter";
        assert_eq!(sanitize(raw), "beforeafter");
    }

    #[test]
    fn strips_orphaned_bracketed_paste_marker() {
        // ESC byte already lost upstream; only the fragment remains.
        let raw = b"hello [?2004h world";
        assert_eq!(sanitize(raw), "hello  world");
    }

    #[test]
    fn drops_non_printable_but_keeps_newline_tab_cr() {
        let raw = b"a\x00b\x0bc\nd\te\rf";
        let cleaned = sanitize(raw);
        assert!(!cleaned.contains('\u{0}'));
        assert!(cleaned.contains('\n'));
        assert!(cleaned.contains('\t'));
    }

    #[test]
    fn elides_copilot_footer_lines() {
        let raw = b"actual content\nCtrl+c Exit\nRemaining requests: 42\nmore content";
        let cleaned = sanitize(raw);
        assert!(cleaned.contains("actual content"));
        assert!(cleaned.contains("more content"));
        assert!(!cleaned.contains("Ctrl+c Exit"));
        assert!(!cleaned.contains("Remaining requests"));
    }

    #[test]
    fn collapses_long_blank_runs() {
        let raw = b"one\n\n\n\n\ntwo";
        let cleaned = sanitize(raw);
        assert_eq!(cleaned, "one\n\n\ntwo");
    }

    #[test]
    fn surfaces_osc9_notification_as_text() {
        let raw = b"\x1b]9;Build complete\x07";
        let cleaned = sanitize(raw);
        assert_eq!(cleaned, "[notify] Build complete");
    }

    #[test]
    fn surfaces_osc777_notification_as_text() {
        let raw = b"\x1b]777;notify;Build Complete;All tests passed\x07";
        let cleaned = sanitize(raw);
        assert_eq!(cleaned, "[notify] Build Complete All tests passed");
    }

    #[test]
    fn is_idempotent() {
        let raw = b"\x1b[31mhello\x1b[0m\n\n\n\nworld\x1b]9;done\x07";
        let once = sanitize(raw);
        let twice = sanitize(once.as_bytes());
        assert_eq!(once, twice);
    }

    #[test]
    fn leaves_no_escape_or_control_bytes() {
        let raw = b"\x1b[1;31mred\x1b[0m\x1b]9;hi\x07normal\x07standalone-bell";
        let cleaned = sanitize(raw);
        for b in cleaned.bytes() {
            assert!(
                !(b < 0x08 || b == 0x0b || b == 0x0c || (0x0e..=0x1f).contains(&b)),
                "leaked control byte {b:#x}"
            );
        }
        assert!(!cleaned.contains('\x1b'));
    }

    #[test]
    fn strips_box_drawing_glyphs() {
        let raw = "\u{250c}\u{2500}\u{2510}\ncontent\n\u{2514}\u{2500}\u{2518}".as_bytes();
        let cleaned = sanitize(raw);
        assert!(cleaned.contains("content"));
        assert!(!cleaned.contains('\u{250c}'));
    }
}
