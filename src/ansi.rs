//! ANSI escape sequence scanning for log lines.
//!
//! This module converts a raw output line containing SGR escape sequences into
//! an ordered list of styled runs. Every line is scanned on its own; style never
//! carries over from one line to the next. Malformed or unsupported sequences are
//! swallowed so the scanner always terminates with some valid run list.

use serde::Serialize;

/// The 16 colors addressable through `30–37`, `90–97`, `40–47` and `100–107`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnsiColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

const COLOR_TABLE: [AnsiColor; 16] = [
    AnsiColor::Black,
    AnsiColor::Red,
    AnsiColor::Green,
    AnsiColor::Yellow,
    AnsiColor::Blue,
    AnsiColor::Magenta,
    AnsiColor::Cyan,
    AnsiColor::White,
    AnsiColor::BrightBlack,
    AnsiColor::BrightRed,
    AnsiColor::BrightGreen,
    AnsiColor::BrightYellow,
    AnsiColor::BrightBlue,
    AnsiColor::BrightMagenta,
    AnsiColor::BrightCyan,
    AnsiColor::BrightWhite,
];

/// A maximal segment of a line sharing one style.
///
/// `text` is HTML-escaped so it can be embedded into markup as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyledRun {
    pub text: String,
    pub color: Option<AnsiColor>,
    pub background_color: Option<AnsiColor>,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
}

impl StyledRun {
    /// True when the run carries no styling at all.
    pub fn is_plain(&self) -> bool {
        self.color.is_none()
            && self.background_color.is_none()
            && !self.bold
            && !self.dim
            && !self.italic
            && !self.underline
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct AnsiState {
    fg: Option<AnsiColor>,
    bg: Option<AnsiColor>,
    bold: bool,
    dim: bool,
    italic: bool,
    underline: bool,
}

impl AnsiState {
    fn to_run(self, text: String) -> StyledRun {
        StyledRun {
            text,
            color: self.fg,
            background_color: self.bg,
            bold: self.bold,
            dim: self.dim,
            italic: self.italic,
            underline: self.underline,
        }
    }
}

/// Scans one raw line into styled runs.
pub fn scan_line(text: &str) -> Vec<StyledRun> {
    let mut runs = Vec::new();
    let mut buffer = String::new();
    let mut state = AnsiState::default();

    for token in Tokens::new(text) {
        match token {
            Token::Text(segment) => buffer.push_str(segment),
            Token::Sgr(params) => {
                let mut next = state;
                apply_sgr(&mut next, params);
                if next != state {
                    flush_run(&mut runs, &mut buffer, state);
                    state = next;
                }
            }
        }
    }
    flush_run(&mut runs, &mut buffer, state);
    runs
}

/// Returns the visible text of a line: every escape sequence removed, nothing escaped.
pub fn strip_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for token in Tokens::new(text) {
        if let Token::Text(segment) = token {
            out.push_str(segment);
        }
    }
    out
}

/// Escapes the characters that are unsafe inside HTML text or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Inverse of `escape_html`.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

impl AnsiColor {
    /// SGR parameter selecting this color as foreground or background.
    pub fn sgr_code(self, background: bool) -> u8 {
        let index = COLOR_TABLE
            .iter()
            .position(|color| *color == self)
            .unwrap_or_default() as u8;
        match (index < 8, background) {
            (true, false) => 30 + index,
            (true, true) => 40 + index,
            (false, false) => 90 + index - 8,
            (false, true) => 100 + index - 8,
        }
    }
}

impl StyledRun {
    /// SGR parameters reproducing this run's style, empty for a plain run.
    pub fn sgr_params(&self) -> Vec<u8> {
        let mut params = Vec::new();
        if self.bold {
            params.push(1);
        }
        if self.dim {
            params.push(2);
        }
        if self.italic {
            params.push(3);
        }
        if self.underline {
            params.push(4);
        }
        if let Some(color) = self.color {
            params.push(color.sgr_code(false));
        }
        if let Some(color) = self.background_color {
            params.push(color.sgr_code(true));
        }
        params
    }
}

fn flush_run(runs: &mut Vec<StyledRun>, buffer: &mut String, state: AnsiState) {
    if buffer.is_empty() {
        return;
    }
    let text = escape_html(buffer);
    buffer.clear();
    runs.push(state.to_run(text));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    /// Parameter bytes of an `ESC [ ... m` sequence.
    Sgr(&'a str),
}

/// Splits a line into literal text and SGR sequences, dropping every other escape.
struct Tokens<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            let rest = &self.text[self.pos..];
            if rest.is_empty() {
                return None;
            }
            let Some(esc) = rest.find('\x1b') else {
                self.pos = self.text.len();
                return Some(Token::Text(rest));
            };
            if esc > 0 {
                self.pos += esc;
                return Some(Token::Text(&rest[..esc]));
            }

            let after = &rest[1..];
            if let Some(body) = after.strip_prefix('[') {
                // CSI: parameters and intermediates up to a final byte in '@'..='~'.
                let Some(end) = body.find(|c: char| ('@'..='~').contains(&c)) else {
                    // Unterminated at end of line.
                    self.pos = self.text.len();
                    return None;
                };
                self.pos += 2 + end + 1;
                if body.as_bytes()[end] == b'm' {
                    return Some(Token::Sgr(&body[..end]));
                }
                continue;
            }
            if let Some(body) = after.strip_prefix(']') {
                // OSC: skip until BEL or ESC \
                let mut consumed = body.len();
                for (idx, ch) in body.char_indices() {
                    if ch == '\x07' {
                        consumed = idx + 1;
                        break;
                    }
                    if ch == '\x1b' && body[idx + 1..].starts_with('\\') {
                        consumed = idx + 2;
                        break;
                    }
                }
                self.pos += 2 + consumed;
                continue;
            }
            // Unknown escape: drop the ESC byte to avoid terminal corruption.
            self.pos += 1;
        }
    }
}

fn apply_sgr(state: &mut AnsiState, params: &str) {
    let values = parse_params(params);
    let mut i = 0;
    while i < values.len() {
        match values[i] {
            0 => *state = AnsiState::default(),
            1 => state.bold = true,
            2 => state.dim = true,
            3 => state.italic = true,
            4 => state.underline = true,
            22 => {
                state.bold = false;
                state.dim = false;
            }
            23 => state.italic = false,
            24 => state.underline = false,
            code @ 30..=37 => state.fg = basic_color(code - 30, false),
            code @ 90..=97 => state.fg = basic_color(code - 90, true),
            39 => state.fg = None,
            code @ 40..=47 => state.bg = basic_color(code - 40, false),
            code @ 100..=107 => state.bg = basic_color(code - 100, true),
            49 => state.bg = None,
            38 | 48 => {
                // 256-color and truecolor forms are outside the palette; skip their
                // arguments so they are not misread as attributes.
                i += extended_color_len(&values[i + 1..]);
            }
            _ => {}
        }
        i += 1;
    }
}

fn parse_params(params: &str) -> Vec<i32> {
    if params.is_empty() {
        return vec![0];
    }
    // Colon sub-parameters and overflowing numbers are skipped, not treated as reset.
    params
        .split(';')
        .filter_map(|part| {
            if part.is_empty() {
                Some(0)
            } else {
                part.parse::<i32>().ok()
            }
        })
        .collect()
}

fn extended_color_len(values: &[i32]) -> usize {
    match values.first() {
        Some(5) => 2.min(values.len()),
        Some(2) => 4.min(values.len()),
        _ => 0,
    }
}

fn basic_color(index: i32, bright: bool) -> Option<AnsiColor> {
    let offset = if bright { 8 } else { 0 };
    usize::try_from(index)
        .ok()
        .filter(|index| *index < 8)
        .map(|index| COLOR_TABLE[index + offset])
}
