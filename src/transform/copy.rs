// src/transform/copy.rs

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::anyhow;

use super::{AtPath, Transform, TransformContext, TransformFailure, TransformFuture};

/// Copy inputs into the output directory.
///
/// Without `base` the result is flat (file names only). With `base`, paths
/// are kept relative to `<root>/<base>`, e.g. `app/css/style.min.css` with
/// `base = "app"` lands at `<output>/css/style.min.css`.
#[derive(Debug, Clone)]
pub struct CopyTransform {
    base: Option<PathBuf>,
}

impl CopyTransform {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }
}

impl Transform for CopyTransform {
    fn kind(&self) -> &'static str {
        "copy"
    }

    fn apply<'a>(&'a self, ctx: &'a TransformContext) -> TransformFuture<'a> {
        Box::pin(async move {
            let base_dir = self.base.as_ref().map(|b| ctx.root.join(b));
            let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
            let mut written = Vec::with_capacity(ctx.inputs.len());

            for input in &ctx.inputs {
                let rel = match &base_dir {
                    Some(base) => input
                        .strip_prefix(base)
                        .map(PathBuf::from)
                        .map_err(|_| {
                            TransformFailure::at(
                                input,
                                anyhow!("input is outside of copy base {:?}", base),
                            )
                        })?,
                    None => input
                        .file_name()
                        .map(PathBuf::from)
                        .ok_or_else(|| TransformFailure::at(input, anyhow!("input has no file name")))?,
                };

                let target = ctx.output_dir.join(rel);
                if let Some(previous) = claimed.insert(target.clone(), input.clone()) {
                    return Err(TransformFailure::at(
                        input,
                        anyhow!("would overwrite {:?} already copied from {:?}", target, previous),
                    ));
                }

                let bytes = ctx.fs.read(input).at_path(input)?;
                ctx.fs.write(&target, &bytes).at_path(&target)?;
                written.push(target);
            }

            Ok(written)
        })
    }
}
