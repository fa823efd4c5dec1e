use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use matfile::{Array, MatFile, NumericData};

use crate::error::{PipelineError, Result};

/// Name and element count of one array in a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub len: usize,
}

fn parse(path: &Path) -> Result<MatFile> {
    let file = File::open(path).map_err(|source| PipelineError::io(path, source))?;
    MatFile::parse(BufReader::new(file))
        .map_err(|err| PipelineError::format(path, format!("not a MAT-file: {err}")))
}

/// Names of the arrays stored in a recording, in file order.
pub fn list_channels(path: &Path) -> Result<Vec<ChannelInfo>> {
    let mat = parse(path)?;
    Ok(mat
        .arrays()
        .iter()
        .map(|array| ChannelInfo {
            name: array.name().to_string(),
            len: array.size().iter().product(),
        })
        .collect())
}

/// Values of the first array whose name satisfies `select`, flattened to `f32`.
pub(super) fn read_channel(path: &Path, select: impl Fn(&str) -> bool) -> Result<Option<Vec<f32>>> {
    let mat = parse(path)?;
    let Some(array) = mat.arrays().iter().find(|array| select(array.name())) else {
        return Ok(None);
    };
    to_f32(array)
        .map(Some)
        .map_err(|message| PipelineError::format(path, message))
}

fn to_f32(array: &Array) -> std::result::Result<Vec<f32>, String> {
    let values = match array.data() {
        NumericData::Double { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::Single { real, .. } => real.clone(),
        NumericData::Int16 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::Int32 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        _ => {
            return Err(format!(
                "channel '{}' has an unsupported numeric class",
                array.name()
            ));
        }
    };
    Ok(values)
}
