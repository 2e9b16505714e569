//! Adapts an rclone configuration so every crypt remote reads from a local
//! staging directory.
//!
//! The document is never parsed into a structure. A four-state scanner walks it
//! line by line, forwarding only stanzas whose `type` is the overlay kind and
//! substituting the staging path for their `remote` field. `ConfigRewriter::step`
//! is pure so each transition can be exercised without any I/O.

use regex::Regex;
use std::sync::OnceLock;

pub const OVERLAY_KIND: &str = "crypt";
pub const TYPE_KEY: &str = "type";
pub const LOCATION_KEY: &str = "remote";

/// Field names and the stanza kind the scanner keys on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRules {
    /// Stanzas are kept only when their type equals this value.
    pub overlay_kind: String,
    /// Key holding the stanza kind.
    pub type_key: String,
    /// Key whose value is replaced by the staging path.
    pub location_key: String,
}

impl Default for RewriteRules {
    fn default() -> Self {
        Self {
            overlay_kind: OVERLAY_KIND.to_string(),
            type_key: TYPE_KEY.to_string(),
            location_key: LOCATION_KEY.to_string(),
        }
    }
}

/// Scanner phase. `TypeCheck` carries the header line held back until the
/// stanza's type is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    SearchingForStart,
    TypeCheck { header: String },
    Writing,
    Completed,
}

impl ScanState {
    pub fn is_completed(&self) -> bool {
        matches!(self, ScanState::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigRewriter {
    rules: RewriteRules,
    type_line: String,
    location_line: String,
}

impl ConfigRewriter {
    pub fn new(rules: RewriteRules, staging_path: &str) -> Self {
        let type_line = format!("{} = {}\n", rules.type_key, rules.overlay_kind);
        let location_line = format!(
            "{} = {}\n",
            rules.location_key,
            normalize_staging_path(staging_path)
        );
        Self {
            rules,
            type_line,
            location_line,
        }
    }

    /// Rewriter with the rclone rules (`type = crypt`, `remote = ...`).
    pub fn for_rclone(staging_path: &str) -> Self {
        Self::new(RewriteRules::default(), staging_path)
    }

    /// Feed one line (without its terminator) and return the next state plus
    /// any text to append to the output.
    pub fn step(&self, state: ScanState, line: &str) -> (ScanState, Option<String>) {
        match state {
            ScanState::SearchingForStart => {
                if is_header(line) {
                    (
                        ScanState::TypeCheck {
                            header: line.to_string(),
                        },
                        None,
                    )
                } else {
                    (ScanState::SearchingForStart, None)
                }
            }
            ScanState::TypeCheck { header } => {
                if is_blank(line) {
                    return (ScanState::SearchingForStart, None);
                }
                if is_header(line) {
                    return (
                        ScanState::TypeCheck {
                            header: line.to_string(),
                        },
                        None,
                    );
                }
                match field(line) {
                    Some((key, value)) if key == self.rules.type_key => {
                        if value == self.rules.overlay_kind {
                            let mut emitted = header;
                            emitted.push('\n');
                            emitted.push_str(&self.type_line);
                            (ScanState::Writing, Some(emitted))
                        } else {
                            (ScanState::SearchingForStart, None)
                        }
                    }
                    _ => (ScanState::TypeCheck { header }, None),
                }
            }
            ScanState::Writing => {
                if is_blank(line) {
                    return (ScanState::SearchingForStart, Some("\n".to_string()));
                }
                if is_header(line) {
                    return (
                        ScanState::TypeCheck {
                            header: line.to_string(),
                        },
                        Some("\n".to_string()),
                    );
                }
                match field(line) {
                    Some((key, _)) if key == self.rules.location_key => {
                        (ScanState::Writing, Some(self.location_line.clone()))
                    }
                    _ => (ScanState::Writing, Some(format!("{line}\n"))),
                }
            }
            ScanState::Completed => (ScanState::Completed, None),
        }
    }

    /// End of input. A stanza still waiting on its type line is dropped.
    pub fn finish(&self, _state: ScanState) -> ScanState {
        ScanState::Completed
    }

    pub fn rewrite<I, S>(&self, lines: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut output = String::new();
        let mut state = ScanState::SearchingForStart;
        for line in lines {
            let (next, emitted) = self.step(state, line.as_ref());
            if let Some(text) = emitted {
                output.push_str(&text);
            }
            state = next;
        }
        debug_assert!(self.finish(state).is_completed());
        output
    }

    pub fn rewrite_document(&self, document: &str) -> String {
        self.rewrite(document.lines())
    }

    /// Headers of kept stanzas whose location line came before their type
    /// line. The scanner skips such a line, so the stanza is emitted without
    /// a location.
    pub fn misplaced_locations(&self, document: &str) -> Vec<String> {
        let mut flagged = Vec::new();
        let mut pending: Option<String> = None;
        let mut state = ScanState::SearchingForStart;

        for line in document.lines() {
            if let ScanState::TypeCheck { header } = &state {
                if matches!(field(line), Some((key, _)) if key == self.rules.location_key) {
                    pending = Some(header.clone());
                }
            }
            let (next, _) = self.step(state, line);
            match &next {
                ScanState::TypeCheck { header } if pending.as_ref() == Some(header) => {}
                ScanState::Writing => flagged.extend(pending.take()),
                _ => pending = None,
            }
            state = next;
        }
        flagged
    }
}

/// Rewrite `document` with the rclone rules, pointing crypt remotes at
/// `staging_path`.
pub fn rewrite(document: &str, staging_path: &str) -> String {
    ConfigRewriter::for_rclone(staging_path).rewrite_document(document)
}

/// Forward slashes only, with exactly one trailing slash.
pub fn normalize_staging_path(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let trimmed = forward.trim_end_matches('/');
    format!("{trimmed}/")
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*\[[^\]]+\]").expect("static header pattern"))
}

fn is_header(line: &str) -> bool {
    header_pattern().is_match(line)
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn field(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay_rules() -> RewriteRules {
        RewriteRules {
            overlay_kind: "overlay".into(),
            type_key: "type".into(),
            location_key: "location".into(),
        }
    }

    #[test]
    fn single_overlay_stanza_points_at_staging() {
        let rewriter = ConfigRewriter::new(overlay_rules(), "/tmp/stageXYZ");
        let out = rewriter.rewrite_document("[enc]\ntype = overlay\nlocation = remote:path\n\n");
        assert_eq!(out, "[enc]\ntype = overlay\nlocation = /tmp/stageXYZ/\n\n");
    }

    #[test]
    fn non_overlay_stanzas_are_dropped() {
        let doc = "\
[gdrive]
type = drive
client_id = abc
token = {\"access_token\":\"x\"}

[secret]
type = crypt
remote = gdrive:vault
password = hunter2
password2 = salt

";
        let out = rewrite(doc, "/home/u/.rclone-decrypt-1");
        assert_eq!(
            out,
            "[secret]\ntype = crypt\nremote = /home/u/.rclone-decrypt-1/\npassword = hunter2\npassword2 = salt\n\n"
        );
    }

    #[test]
    fn type_value_is_normalised_and_trimmed() {
        let out = rewrite("[a]\ntype=   crypt   \nremote=x:\n", "/s");
        assert_eq!(out, "[a]\ntype = crypt\nremote = /s/\n");
    }

    #[test]
    fn location_before_type_is_flagged() {
        let rewriter = ConfigRewriter::for_rclone("/s");
        let doc = "[s]\nremote = g:enc\ntype = crypt\npassword = x\n\n";
        assert_eq!(rewriter.rewrite_document(doc), "[s]\ntype = crypt\npassword = x\n\n");
        assert_eq!(rewriter.misplaced_locations(doc), vec!["[s]".to_string()]);
    }

    #[test]
    fn misplaced_location_in_dropped_stanza_is_not_flagged() {
        let rewriter = ConfigRewriter::for_rclone("/s");
        let doc = "[g]\nremote = x:\ntype = drive\n\n[ok]\ntype = crypt\nremote = g:enc\n\n";
        assert!(rewriter.misplaced_locations(doc).is_empty());
    }

    #[test]
    fn windows_staging_path_uses_forward_slashes() {
        let out = rewrite("[a]\ntype = crypt\nremote = x:\n\n", r"C:\Users\u\tmpab12\");
        assert!(out.contains("remote = C:/Users/u/tmpab12/\n"));
    }

    #[test]
    fn lookalike_keys_do_not_match() {
        let doc = "[a]\nfilename_encryption_type = crypt\ntype = local\n\n";
        assert_eq!(rewrite(doc, "/s"), "");

        let doc = "[b]\ntype = crypt\nremote_path = keep\nremote = gone\n\n";
        assert_eq!(
            rewrite(doc, "/s"),
            "[b]\ntype = crypt\nremote_path = keep\nremote = /s/\n\n"
        );
    }

    #[test]
    fn empty_and_headerless_documents_produce_nothing() {
        assert_eq!(rewrite("", "/s"), "");
        assert_eq!(rewrite("type = crypt\nremote = x:\n", "/s"), "");
    }

    #[test]
    fn stanza_without_type_is_abandoned_at_blank_line() {
        let doc = "[orphan]\nremote = x:\n\n[b]\ntype = crypt\nremote = y:\n\n";
        assert_eq!(rewrite(doc, "/s"), "[b]\ntype = crypt\nremote = /s/\n\n");
    }

    #[test]
    fn adjacent_header_closes_kept_stanza() {
        let doc = "[a]\ntype = crypt\nremote = x:\n[b]\ntype = s3\nregion = eu\n[c]\ntype = crypt\nremote = z:\n";
        assert_eq!(
            rewrite(doc, "/s"),
            "[a]\ntype = crypt\nremote = /s/\n\n[c]\ntype = crypt\nremote = /s/\n"
        );
    }

    #[test]
    fn step_caches_header_until_type_is_known() {
        let rewriter = ConfigRewriter::for_rclone("/s");
        let (state, out) = rewriter.step(ScanState::SearchingForStart, "[enc]");
        assert_eq!(
            state,
            ScanState::TypeCheck {
                header: "[enc]".into()
            }
        );
        assert_eq!(out, None);

        let (state, out) = rewriter.step(state, "type = crypt");
        assert_eq!(state, ScanState::Writing);
        assert_eq!(out.as_deref(), Some("[enc]\ntype = crypt\n"));

        let (state, out) = rewriter.step(state, "");
        assert_eq!(state, ScanState::SearchingForStart);
        assert_eq!(out.as_deref(), Some("\n"));
    }

    #[test]
    fn rejected_type_discards_cached_header() {
        let rewriter = ConfigRewriter::for_rclone("/s");
        let state = ScanState::TypeCheck {
            header: "[drive]".into(),
        };
        let (state, out) = rewriter.step(state, "type = drive");
        assert_eq!(state, ScanState::SearchingForStart);
        assert_eq!(out, None);
    }

    #[test]
    fn completed_is_absorbing_and_reached_from_every_state() {
        let rewriter = ConfigRewriter::for_rclone("/s");
        let states = [
            ScanState::SearchingForStart,
            ScanState::TypeCheck {
                header: "[x]".into(),
            },
            ScanState::Writing,
            ScanState::Completed,
        ];
        for state in states {
            assert!(rewriter.finish(state).is_completed());
        }
        assert_eq!(
            rewriter.step(ScanState::Completed, "[y]"),
            (ScanState::Completed, None)
        );
    }

    #[test]
    fn every_kept_stanza_has_overlay_type_and_staging_location() {
        let doc = "\
[one]
type = crypt
remote = a:b

[two]
type = sftp
host = example.org

[three]
type = crypt
remote = c:/d/e
filename_encryption = standard

[four]
type = local
";
        let out = rewrite(doc, "/stage/");
        let stanzas: Vec<&str> = out.split("\n\n").filter(|s| !s.trim().is_empty()).collect();
        assert_eq!(stanzas.len(), 2);
        for stanza in stanzas {
            assert!(stanza.contains("\ntype = crypt\n"));
            assert!(stanza.contains("remote = /stage/"));
            assert!(!stanza.contains("remote = a:b"));
        }
    }

    #[test]
    fn staging_path_gets_single_trailing_slash() {
        assert_eq!(normalize_staging_path("/tmp/x"), "/tmp/x/");
        assert_eq!(normalize_staging_path("/tmp/x//"), "/tmp/x/");
        assert_eq!(normalize_staging_path(r"D:\a\b"), "D:/a/b/");
    }
}
