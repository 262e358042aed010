//! Statement-level lexing (spec §4.7's "one statement per source line"
//! dialect): comment stripping, label-prefix extraction, and splitting a
//! line into its directive/mnemonic head and raw operand tail. Expression
//! lexing proper lives in `gba_asm_expr` — this layer only slices text.

/// One parsed line, before its directive/mnemonic-specific grammar runs.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    /// Ordinary `name:` labels prefixing this line, in source order.
    pub labels: Vec<String>,
    /// The directive name (without its leading `.`, lowercased) or the raw
    /// mnemonic token; `None` if the line was only labels.
    pub head: Option<String>,
    pub is_directive: bool,
    /// Everything after the head token, trimmed, comments already removed.
    pub rest: String,
}

/// Removes a trailing `;` or `//` comment, respecting string literals so a
/// `;` inside a `.str`/`.printf` format string doesn't truncate it.
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_str = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_str = !in_str,
            b';' if !in_str => return &line[..i],
            b'/' if !in_str && i + 1 < bytes.len() && bytes[i + 1] == b'/' => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Strips one leading `name:` label off `s`, if present, returning the
/// label and the remaining trimmed text. A label may carry a leading run of
/// `-`/`+` sigils (`--loop:`, `++loop:`) marking it as reverse/forward
/// relative (spec §4.7 "Relative labels"); the sigils are stripped here so
/// the bare name is what gets defined, matching the identifier
/// `gba_asm_expr` extracts on the reference side (`--loop` resolves against
/// a label named `loop`, not `--loop`).
fn take_label(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let sigil_run = s.find(|c: char| c != '-' && c != '+').unwrap_or(s.len());
    let body = &s[sigil_run..];
    let mut chars = body.char_indices();
    let (_, first) = chars.next()?;
    if !is_ident_start(first) {
        return None;
    }
    let mut end = first.len_utf8();
    for (i, c) in chars {
        if is_ident_continue(c) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    let name = &body[..end];
    let after = body[end..].trim_start();
    let after = after.strip_prefix(':')?;
    Some((name, after))
}

/// Splits `line` (comment already stripped by the caller) into its label
/// prefixes and directive/mnemonic head.
pub fn parse_statement(line: &str) -> Statement {
    let mut rest = line.trim();
    let mut labels = Vec::new();
    while let Some((name, after)) = take_label(rest) {
        labels.push(name.to_string());
        rest = after.trim_start();
    }
    if rest.is_empty() {
        return Statement {
            labels,
            head: None,
            is_directive: false,
            rest: String::new(),
        };
    }
    let is_directive = rest.starts_with('.');
    let body = if is_directive { &rest[1..] } else { rest };
    let split_at = body.find(char::is_whitespace).unwrap_or(body.len());
    let (head, tail) = body.split_at(split_at);
    Statement {
        labels,
        head: Some(head.to_lowercase()),
        is_directive,
        rest: tail.trim().to_string(),
    }
}

/// Unescapes a quoted string literal's contents (spec §4.7 lexer: `\n \t \\
/// \" \0` are the only recognised escapes — anything else passes through
/// verbatim rather than erroring, matching a casual assembler's string
/// grammar rather than a strict one).
pub fn unquote(s: &str) -> Option<String> {
    let s = s.trim();
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_after_code_is_stripped() {
        assert_eq!(strip_comment("mov r0, #1 ; set flag"), "mov r0, #1 ");
        assert_eq!(strip_comment("mov r0, #1 // set flag"), "mov r0, #1 ");
    }

    #[test]
    fn semicolon_inside_string_survives() {
        assert_eq!(strip_comment(r#".str "a;b""#), r#".str "a;b""#);
    }

    #[test]
    fn label_then_instruction() {
        let st = parse_statement("loop: mov r0, #1");
        assert_eq!(st.labels, vec!["loop"]);
        assert_eq!(st.head.as_deref(), Some("mov"));
        assert_eq!(st.rest, "r0, #1");
    }

    #[test]
    fn multiple_labels_strip_in_order() {
        let st = parse_statement("outer: inner: bx lr");
        assert_eq!(st.labels, vec!["outer", "inner"]);
        assert_eq!(st.head.as_deref(), Some("bx"));
    }

    #[test]
    fn directive_head_is_lowercased_without_dot() {
        let st = parse_statement(".Align 4, 0");
        assert!(st.is_directive);
        assert_eq!(st.head.as_deref(), Some("align"));
        assert_eq!(st.rest, "4, 0");
    }

    #[test]
    fn label_only_line_has_no_head() {
        let st = parse_statement("done:");
        assert_eq!(st.labels, vec!["done"]);
        assert_eq!(st.head, None);
    }

    #[test]
    fn relative_label_sigils_are_stripped() {
        let st = parse_statement("--loop: mov r0, r1");
        assert_eq!(st.labels, vec!["loop"]);
        assert_eq!(st.head.as_deref(), Some("mov"));

        let st = parse_statement("++done: bx lr");
        assert_eq!(st.labels, vec!["done"]);
    }
}
