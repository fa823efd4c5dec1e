use std::path::{Path, PathBuf};

use tracing::info;

use super::PipelineContext;
use crate::error::Result;
use crate::plots;

/// Plot the first `ctx.preview_points` samples of a recording into the cache.
///
/// Returns the `<cache>/<stem>.png` path that was written.
pub fn render_preview(ctx: &PipelineContext, recording: &Path) -> Result<PathBuf> {
    let values = ctx.loader.preview(recording, ctx.preview_points)?;
    ctx.cache.ensure()?;
    let path = ctx.cache.preview_path(recording);
    plots::render_signal_preview(&values, &path)?;
    info!(
        "Previewed {} points of {} at {}",
        values.len(),
        recording.display(),
        path.display()
    );
    Ok(path)
}
