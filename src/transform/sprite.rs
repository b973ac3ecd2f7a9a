// src/transform/sprite.rs

//! SVG sprite in "stack" mode.
//!
//! Each input becomes a nested `<svg id="<stem>">` inside one document. A
//! small stylesheet hides every icon except the one addressed by the URL
//! fragment, so `sprite.svg#logo` renders only `logo`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;

use super::{AtPath, Transform, TransformContext, TransformFailure, TransformFuture};

const SPRITE_HEADER: &str = concat!(
    r#"<?xml version="1.0" encoding="utf-8"?>"#,
    r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
    "<style>:root>svg{display:none}:root>svg:target{display:block}</style>",
);
const SPRITE_FOOTER: &str = "</svg>";

const ATTRIBUTE: &str = r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#;

/// Attributes carried from an icon's root element onto its nested `<svg>`.
const KEPT_ATTRIBUTES: &[&str] = &["viewBox", "preserveAspectRatio", "fill", "stroke"];

#[derive(Debug, Clone)]
pub struct SpriteTransform {
    file: String,
    attribute: Regex,
}

impl SpriteTransform {
    pub fn new(file: impl Into<String>) -> Result<Self> {
        Ok(Self {
            file: file.into(),
            attribute: Regex::new(ATTRIBUTE).context("compiling svg attribute pattern")?,
        })
    }

    fn symbol(&self, id: &str, source: &str) -> Result<String> {
        let icon = split_root(source)?;

        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut width = None;
        let mut height = None;
        for caps in self.attribute.captures_iter(icon.attributes) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match name {
                "width" => width = Some(value.to_string()),
                "height" => height = Some(value.to_string()),
                _ if KEPT_ATTRIBUTES.contains(&name) => attrs.push((name.to_string(), value.to_string())),
                _ => {}
            }
        }

        if !attrs.iter().any(|(name, _)| name == "viewBox") {
            if let (Some(w), Some(h)) = (width.as_deref(), height.as_deref()) {
                let w = w.trim_end_matches("px");
                let h = h.trim_end_matches("px");
                attrs.insert(0, ("viewBox".to_string(), format!("0 0 {w} {h}")));
            }
        }

        let mut out = format!(r#"<svg id="{id}""#);
        for (name, value) in &attrs {
            out.push_str(&format!(r#" {name}="{value}""#));
        }
        out.push('>');
        out.push_str(icon.body.trim());
        out.push_str("</svg>");
        Ok(out)
    }
}

impl Transform for SpriteTransform {
    fn kind(&self) -> &'static str {
        "sprite"
    }

    fn apply<'a>(&'a self, ctx: &'a TransformContext) -> TransformFuture<'a> {
        Box::pin(async move {
            let mut ids = BTreeSet::new();
            let mut out = String::from(SPRITE_HEADER);

            for input in &ctx.inputs {
                let id = icon_id(input).at_path(input)?;
                if !ids.insert(id.clone()) {
                    return Err(TransformFailure::at(input, anyhow!("duplicate icon id '{id}'")));
                }
                let source = ctx.fs.read_to_string(input).at_path(input)?;
                out.push_str(&self.symbol(&id, &source).at_path(input)?);
            }
            out.push_str(SPRITE_FOOTER);

            let target = ctx.output_dir.join(&self.file);
            ctx.fs.write(&target, out.as_bytes()).at_path(&target)?;
            Ok(vec![target])
        })
    }
}

struct IconParts<'s> {
    attributes: &'s str,
    body: &'s str,
}

/// Locate the root `<svg ...>` element and split it into its attribute
/// text and inner markup.
fn split_root(source: &str) -> Result<IconParts<'_>> {
    let start = source
        .find("<svg")
        .ok_or_else(|| anyhow!("no <svg> element found"))?;
    let rest = &source[start + "<svg".len()..];
    let tag_end = rest
        .find('>')
        .ok_or_else(|| anyhow!("unterminated <svg> start tag"))?;

    let raw_attrs = &rest[..tag_end];
    if let Some(attributes) = raw_attrs.strip_suffix('/') {
        return Ok(IconParts { attributes, body: "" });
    }

    let after = &rest[tag_end + 1..];
    let close = after
        .rfind("</svg>")
        .ok_or_else(|| anyhow!("missing closing </svg>"))?;
    Ok(IconParts {
        attributes: raw_attrs,
        body: &after[..close],
    })
}

fn icon_id(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("icon file name is not valid UTF-8"))?;
    let id: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if id.is_empty() {
        bail!("icon file has an empty name");
    }
    Ok(id)
}
