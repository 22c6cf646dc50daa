//! Inline markup used in chapter content: `**bold**`, `*italic*` and line
//! breaks.
//!
//! Bold is substituted before italic so the single-asterisk pattern does not
//! match inside a double-asterisk pair. There is no nesting and no escaping:
//! an unpaired `*` stays literal, and inputs such as `*a**b*c**` come out
//! mis-nested.

use std::sync::LazyLock;

use regex::Regex;

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());

pub fn to_html(text: &str) -> String {
    let html = BOLD.replace_all(text, "<strong>$1</strong>");
    let html = ITALIC.replace_all(&html, "<em>$1</em>");
    html.replace('\n', "<br>")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Plain,
    Bold,
    Italic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub emphasis: Emphasis,
}

/// Styled runs per line, for renderers that do not speak HTML.
pub fn segments(text: &str) -> Vec<Vec<Segment>> {
    text.split('\n')
        .map(|line| line_segments(line.strip_suffix('\r').unwrap_or(line)))
        .collect()
}

fn line_segments(line: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut last = 0;
    for caps in BOLD.captures_iter(line) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_italic(&mut out, &line[last..whole.start()]);
        push(
            &mut out,
            caps.get(1).map_or("", |m| m.as_str()),
            Emphasis::Bold,
        );
        last = whole.end();
    }
    push_italic(&mut out, &line[last..]);
    out
}

fn push_italic(out: &mut Vec<Segment>, text: &str) {
    let mut last = 0;
    for caps in ITALIC.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push(out, &text[last..whole.start()], Emphasis::Plain);
        push(
            out,
            caps.get(1).map_or("", |m| m.as_str()),
            Emphasis::Italic,
        );
        last = whole.end();
    }
    push(out, &text[last..], Emphasis::Plain);
}

fn push(out: &mut Vec<Segment>, text: &str, emphasis: Emphasis) {
    if text.is_empty() {
        return;
    }
    if let Some(prev) = out.last_mut()
        && prev.emphasis == emphasis
    {
        prev.text.push_str(text);
        return;
    }
    out.push(Segment {
        text: text.to_string(),
        emphasis,
    });
}
