// src/transform/clean.rs

use tracing::info;

use super::{AtPath, Transform, TransformContext, TransformFuture};

/// Remove the output directory.
///
/// Declares no outputs of its own, so it may target a directory owned by
/// another task (typically the `dist` tree it prepares).
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanTransform;

impl Transform for CleanTransform {
    fn kind(&self) -> &'static str {
        "clean"
    }

    fn writes_outputs(&self) -> bool {
        false
    }

    fn apply<'a>(&'a self, ctx: &'a TransformContext) -> TransformFuture<'a> {
        Box::pin(async move {
            ctx.fs
                .remove_dir_all(&ctx.output_dir)
                .at_path(&ctx.output_dir)?;
            info!(task = %ctx.task, dir = ?ctx.output_dir, "removed output directory");
            Ok(Vec::new())
        })
    }
}
