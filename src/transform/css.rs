// src/transform/css.rs

//! Style-sheet compression with vendor prefixing.
//!
//! Inputs are plain CSS. `.scss` files are accepted only when they are
//! written CSS-compatible; anything that needs a Sass compiler (variables,
//! nesting, `//` comments, Sass at-rules) is rejected, and such sources
//! must be compiled by an upstream `command` task. The output is a single compressed
//! file: comments dropped, whitespace collapsed, the final `;` of each block
//! removed, and prefixed copies of selected declarations emitted before the
//! standard one according to the configured browser targets.

use std::path::Path;

use anyhow::{anyhow, Context};

use super::{AtPath, Transform, TransformContext, TransformFuture};

/// How far back the browser targets reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrowserTargets {
    legacy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    /// Still required by current evergreen browsers.
    Modern,
    /// Only required by old versions.
    Legacy,
}

impl BrowserTargets {
    /// Current evergreen browsers only.
    pub fn modern() -> Self {
        Self { legacy: false }
    }

    /// Include old browser versions.
    pub fn legacy() -> Self {
        Self { legacy: true }
    }

    /// Interpret browserslist-style queries.
    ///
    /// `last N versions` with N >= 4, or any `ie` query, selects legacy
    /// targets. Everything else (including an empty list) is modern.
    pub fn from_queries(queries: &[String]) -> Self {
        let legacy = queries.iter().any(|q| {
            let q = q.trim().to_lowercase();
            if q == "ie" || q.starts_with("ie ") {
                return true;
            }
            q.strip_prefix("last ")
                .and_then(|rest| {
                    rest.strip_suffix(" versions")
                        .or_else(|| rest.strip_suffix(" version"))
                })
                .and_then(|n| n.trim().parse::<u32>().ok())
                .is_some_and(|n| n >= 4)
        });
        Self { legacy }
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    fn wants(&self, tier: Tier) -> bool {
        tier == Tier::Modern || self.legacy
    }
}

type Prefixes = &'static [(&'static str, Tier)];

const PROPERTY_PREFIXES: &[(&str, Prefixes)] = &[
    ("user-select", &[("-webkit-", Tier::Modern), ("-moz-", Tier::Legacy), ("-ms-", Tier::Legacy)]),
    ("appearance", &[("-webkit-", Tier::Modern), ("-moz-", Tier::Modern)]),
    ("backdrop-filter", &[("-webkit-", Tier::Modern)]),
    ("text-size-adjust", &[("-webkit-", Tier::Modern), ("-moz-", Tier::Legacy), ("-ms-", Tier::Legacy)]),
    ("mask-image", &[("-webkit-", Tier::Modern)]),
    ("hyphens", &[("-webkit-", Tier::Modern), ("-ms-", Tier::Legacy)]),
    ("clip-path", &[("-webkit-", Tier::Legacy)]),
    ("tab-size", &[("-moz-", Tier::Legacy)]),
    ("transform", &[("-webkit-", Tier::Legacy), ("-ms-", Tier::Legacy)]),
    ("transition", &[("-webkit-", Tier::Legacy)]),
    ("animation", &[("-webkit-", Tier::Legacy)]),
    ("box-sizing", &[("-webkit-", Tier::Legacy)]),
];

/// (property, value) pairs whose *value* gets prefixed alternatives.
const VALUE_PREFIXES: &[(&str, &str, Prefixes)] = &[
    ("display", "flex", &[("-webkit-box", Tier::Legacy), ("-ms-flexbox", Tier::Legacy)]),
    ("display", "inline-flex", &[("-webkit-inline-box", Tier::Legacy), ("-ms-inline-flexbox", Tier::Legacy)]),
    ("display", "grid", &[("-ms-grid", Tier::Legacy)]),
    ("position", "sticky", &[("-webkit-sticky", Tier::Modern)]),
];

/// Compress and prefix every input into one `file`.
#[derive(Debug, Clone)]
pub struct CssTransform {
    file: String,
    targets: BrowserTargets,
}

impl CssTransform {
    pub fn new(file: impl Into<String>, targets: BrowserTargets) -> Self {
        Self {
            file: file.into(),
            targets,
        }
    }
}

impl Transform for CssTransform {
    fn kind(&self) -> &'static str {
        "css"
    }

    fn is_stylesheet(&self) -> bool {
        true
    }

    fn apply<'a>(&'a self, ctx: &'a TransformContext) -> TransformFuture<'a> {
        Box::pin(async move {
            let mut out = String::new();
            for input in &ctx.inputs {
                let source = ctx.fs.read_to_string(input).at_path(input)?;
                check_sass_free(input, &source).at_path(input)?;
                out.push_str(&compress(&source, self.targets));
            }

            let target = ctx.output_dir.join(&self.file);
            ctx.fs
                .write(&target, out.as_bytes())
                .with_context(|| format!("writing style sheet for '{}'", ctx.task))
                .at_path(&target)?;
            Ok(vec![target])
        })
    }
}

/// Compress one style sheet.
pub fn compress(source: &str, targets: BrowserTargets) -> String {
    let stripped = strip_comments(source);
    let mut out = String::with_capacity(stripped.len());
    let mut depth = 0usize;
    // Whether the current block already holds a declaration (needs `;`).
    let mut open_decl = false;

    for (text, terminator) in split_segments(&stripped) {
        let text = collapse_whitespace(&text);
        match terminator {
            Some('{') => {
                out.push_str(&compact_prelude(&text));
                out.push('{');
                depth += 1;
                open_decl = false;
            }
            Some(';') if depth == 0 => {
                if !text.is_empty() {
                    out.push_str(&text);
                    out.push(';');
                }
            }
            Some(';') | Some('}') | None => {
                if !text.is_empty() {
                    if open_decl {
                        out.push(';');
                    }
                    out.push_str(&expand_declaration(&text, targets));
                    open_decl = true;
                }
                if terminator == Some('}') {
                    out.push('}');
                    depth = depth.saturating_sub(1);
                    open_decl = false;
                }
            }
            Some(_) => {}
        }
    }

    out
}

/// Sass at-rules with no CSS meaning.
const SASS_AT_RULES: &[&str] = &[
    "use", "forward", "import", "mixin", "include", "extend", "function", "return", "each",
    "for", "if", "else", "while", "debug", "warn", "error",
];

fn check_sass_free(input: &Path, source: &str) -> anyhow::Result<()> {
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("sass") => Err(anyhow!(
            "indented Sass syntax cannot be compressed directly; compile it with a `command` task first"
        )),
        Some("scss") => match sass_only_syntax(source) {
            Some(feature) => Err(anyhow!(
                "{feature} needs a Sass compiler; compile it with a `command` task first"
            )),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

/// First construct in `source` that plain CSS does not have, if any.
///
/// `@import` of a plain `.css` URL is still CSS and is let through.
pub fn sass_only_syntax(source: &str) -> Option<String> {
    let stripped = strip_comments(source);
    // One entry per open block; true for style rules.
    let mut blocks: Vec<bool> = Vec::new();

    for (text, terminator) in split_segments(&stripped) {
        let text = text.trim();

        if let Some(line) = text.lines().map(str::trim).find(|l| l.starts_with("//")) {
            return Some(format!("line comment `{line}`"));
        }
        if let Some(rest) = text.strip_prefix('@') {
            let word: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect();
            let plain_import = word == "import" && (rest.contains(".css") || rest.contains("url("));
            if SASS_AT_RULES.contains(&word.as_str()) && !plain_import {
                return Some(format!("at-rule `@{word}`"));
            }
        }
        if let Some(var) = unquoted_variable(text) {
            return Some(format!("variable `{var}`"));
        }

        match terminator {
            Some('{') => {
                if blocks.last() == Some(&true) {
                    return Some(format!("nested rule `{}`", collapse_whitespace(text)));
                }
                blocks.push(!text.starts_with('@'));
            }
            Some('}') => {
                blocks.pop();
            }
            _ => {}
        }
    }

    None
}

/// A `$name` outside strings and attribute selectors (`[href$=".pdf"]`).
fn unquoted_variable(text: &str) -> Option<String> {
    let mut quote: Option<char> = None;
    let mut brackets = 0usize;
    let mut chars = text.char_indices();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' => brackets += 1,
            ']' => brackets = brackets.saturating_sub(1),
            '$' if brackets == 0 => {
                let name: String = text[i..]
                    .chars()
                    .take_while(|c| *c == '$' || c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                    .collect();
                return Some(name);
            }
            _ => {}
        }
    }
    None
}

/// Drop `/* ... */` comments outside of strings.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

/// Split on `{`, `}` and `;`, ignoring those inside strings and parentheses
/// (`url(data:...;base64,...)`).
fn split_segments(source: &str) -> Vec<(String, Option<char>)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut parens = 0usize;
    let mut chars = source.chars();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                parens += 1;
                current.push(c);
            }
            ')' => {
                parens = parens.saturating_sub(1);
                current.push(c);
            }
            '{' | '}' | ';' if parens == 0 => {
                segments.push((std::mem::take(&mut current), Some(c)));
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        segments.push((current, None));
    }
    segments
}

/// Collapse whitespace runs outside strings into one space and trim.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in text.trim().chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }

    out
}

/// Remove the spaces around `chars` (outside strings).
fn tighten(text: &str, chars: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut iter = text.chars().peekable();

    while let Some(c) = iter.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
            out.push(c);
            continue;
        }
        if c == ' ' && (out.ends_with(chars) || iter.peek().is_some_and(|n| chars.contains(n))) {
            continue;
        }
        out.push(c);
    }

    out
}

fn compact_prelude(text: &str) -> String {
    if text.starts_with('@') {
        tighten(text, &[',', ':'])
    } else {
        tighten(text, &[',', '>', '+', '~'])
    }
}

fn compact_value(value: &str) -> String {
    tighten(value, &[',', '!'])
}

/// Compact one declaration and emit its prefixed variants first.
fn expand_declaration(text: &str, targets: BrowserTargets) -> String {
    let Some((prop, value)) = text.split_once(':') else {
        return text.to_string();
    };
    let prop = prop.trim().to_lowercase();
    let value = compact_value(value.trim());

    let mut parts: Vec<String> = Vec::new();

    if !prop.starts_with('-') {
        if let Some((_, prefixes)) = PROPERTY_PREFIXES.iter().find(|(p, _)| *p == prop) {
            for (prefix, tier) in prefixes.iter() {
                if targets.wants(*tier) {
                    parts.push(format!("{prefix}{prop}:{value}"));
                }
            }
        }

        let bare_value = value.trim_end_matches("!important");
        let important = &value[bare_value.len()..];
        if let Some((_, _, alternatives)) = VALUE_PREFIXES
            .iter()
            .find(|(p, v, _)| *p == prop && *v == bare_value)
        {
            for (alt, tier) in alternatives.iter() {
                if targets.wants(*tier) {
                    parts.push(format!("{prop}:{alt}{important}"));
                }
            }
        }
    }

    parts.push(format!("{prop}:{value}"));
    parts.join(";")
}
