// src/transform/concat.rs

use anyhow::Context;

use super::{AtPath, Transform, TransformContext, TransformFuture};

/// Join every input, in input order, into a single `file`.
#[derive(Debug, Clone)]
pub struct ConcatTransform {
    file: String,
    separator: String,
}

impl ConcatTransform {
    pub fn new(file: impl Into<String>, separator: Option<String>) -> Self {
        Self {
            file: file.into(),
            separator: separator.unwrap_or_else(|| "\n".to_string()),
        }
    }
}

impl Transform for ConcatTransform {
    fn kind(&self) -> &'static str {
        "concat"
    }

    fn apply<'a>(&'a self, ctx: &'a TransformContext) -> TransformFuture<'a> {
        Box::pin(async move {
            let mut out: Vec<u8> = Vec::new();
            for (idx, input) in ctx.inputs.iter().enumerate() {
                if idx > 0 {
                    out.extend_from_slice(self.separator.as_bytes());
                }
                let bytes = ctx.fs.read(input).at_path(input)?;
                out.extend_from_slice(&bytes);
            }

            let target = ctx.output_dir.join(&self.file);
            ctx.fs
                .write(&target, &out)
                .with_context(|| format!("writing concatenated output for '{}'", ctx.task))
                .at_path(&target)?;
            Ok(vec![target])
        })
    }
}
