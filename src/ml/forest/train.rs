use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{DecisionTree, Node, RandomForestModel};
use crate::error::{PipelineError, Result};

/// Training hyperparameters for the tree ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestOptions {
    /// Number of bootstrap trees.
    pub n_trees: usize,
    pub max_depth: usize,
    /// Nodes with fewer rows become leaves.
    pub min_samples_split: usize,
    /// Number of bins used for split search.
    pub bins: usize,
    /// Features considered per split; `None` means `sqrt(feature_len)`.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 16,
            min_samples_split: 2,
            bins: 32,
            max_features: None,
            seed: 42,
        }
    }
}

impl ForestOptions {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 || self.max_depth == 0 {
            return Err(PipelineError::Config(
                "forest needs at least one tree of depth >= 1".into(),
            ));
        }
        if !(2..=256).contains(&self.bins) {
            return Err(PipelineError::Config(format!(
                "forest bins must be in 2..=256, got {}",
                self.bins
            )));
        }
        if self.max_features == Some(0) {
            return Err(PipelineError::Config("max_features must be positive".into()));
        }
        Ok(())
    }

    fn features_per_split(&self, feature_len: usize) -> usize {
        self.max_features
            .unwrap_or_else(|| (feature_len as f64).sqrt().round() as usize)
            .clamp(1, feature_len.max(1))
    }
}

/// In-memory dataset used for training and evaluation.
#[derive(Debug, Clone)]
pub struct TrainDataset {
    /// Number of `f32` values in each feature vector.
    pub feature_len_f32: usize,
    /// Feature vector version.
    pub feat_version: u32,
    /// Ordered list of class identifiers.
    pub classes: Vec<String>,
    /// Feature matrix, row-major.
    pub x: Vec<Vec<f32>>,
    /// Class indices aligned with `x`.
    pub y: Vec<usize>,
}

/// Fit a random forest: bootstrap rows per tree, random feature subsets per split, gini impurity.
pub fn train_random_forest(
    dataset: &TrainDataset,
    options: &ForestOptions,
) -> Result<RandomForestModel> {
    options.validate()?;
    if dataset.x.len() != dataset.y.len() {
        return Err(PipelineError::Training("mismatched X/Y lengths".into()));
    }
    if dataset.x.is_empty() {
        return Err(PipelineError::Training("empty dataset".into()));
    }
    let n_classes = dataset.classes.len();
    if n_classes < 2 {
        return Err(PipelineError::Training("need at least 2 classes".into()));
    }
    if let Some(&bad) = dataset.y.iter().find(|&&label| label >= n_classes) {
        return Err(PipelineError::Training(format!("label {bad} out of range")));
    }

    let d = dataset.feature_len_f32;
    let (mins, maxs) = compute_feature_min_max(&dataset.x, d);
    let binned = bin_features(&dataset.x, &mins, &maxs, options.bins);
    let grid = Grid {
        binned: &binned,
        x: &dataset.x,
        y: &dataset.y,
        mins: &mins,
        maxs: &maxs,
        bins: options.bins,
        n_classes,
        mtry: options.features_per_split(d),
    };

    let n = dataset.x.len();
    let mut trees = Vec::with_capacity(options.n_trees);
    for tree_idx in 0..options.n_trees {
        let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(tree_idx as u64));
        let rows: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
        let tree = grow_tree(&grid, rows, options, &mut rng);
        debug!("tree {tree_idx}: {} nodes, depth {}", tree.nodes.len(), tree.depth());
        trees.push(tree);
    }

    Ok(RandomForestModel {
        feat_version: dataset.feat_version,
        feature_len_f32: d,
        classes: dataset.classes.clone(),
        trees,
    })
}

struct Grid<'a> {
    binned: &'a [Vec<u8>],
    x: &'a [Vec<f32>],
    y: &'a [usize],
    mins: &'a [f32],
    maxs: &'a [f32],
    bins: usize,
    n_classes: usize,
    mtry: usize,
}

struct Pending {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
}

fn grow_tree(grid: &Grid<'_>, rows: Vec<usize>, options: &ForestOptions, rng: &mut StdRng) -> DecisionTree {
    let mut nodes = vec![placeholder()];
    let mut stack = vec![Pending {
        node: 0,
        rows,
        depth: 0,
    }];
    while let Some(Pending { node, rows, depth }) = stack.pop() {
        let counts = class_counts(grid.y, &rows, grid.n_classes);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let split = if pure || depth >= options.max_depth || rows.len() < options.min_samples_split {
            None
        } else {
            best_split(grid, &rows, &counts, rng)
        };
        let Some((feature_idx, threshold)) = split else {
            nodes[node] = leaf(&counts);
            continue;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&row| grid.x[row].get(feature_idx).copied().unwrap_or(0.0) <= threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            nodes[node] = leaf(&counts);
            continue;
        }
        let left = nodes.len();
        nodes.push(placeholder());
        let right = nodes.len();
        nodes.push(placeholder());
        nodes[node] = Node::Split {
            feature_index: feature_idx as u16,
            threshold,
            left: left as u32,
            right: right as u32,
        };
        stack.push(Pending {
            node: right,
            rows: right_rows,
            depth: depth + 1,
        });
        stack.push(Pending {
            node: left,
            rows: left_rows,
            depth: depth + 1,
        });
    }
    DecisionTree { nodes }
}

fn placeholder() -> Node {
    Node::Leaf {
        distribution: Vec::new(),
    }
}

fn leaf(counts: &[usize]) -> Node {
    let total = counts.iter().sum::<usize>().max(1) as f32;
    Node::Leaf {
        distribution: counts.iter().map(|&c| c as f32 / total).collect(),
    }
}

fn class_counts(y: &[usize], rows: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &row in rows {
        counts[y[row]] += 1;
    }
    counts
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Best `(feature, threshold)` among a random feature subset, if any split lowers impurity.
fn best_split(
    grid: &Grid<'_>,
    rows: &[usize],
    parent_counts: &[usize],
    rng: &mut StdRng,
) -> Option<(usize, f32)> {
    let n_features = grid.mins.len();
    if n_features == 0 {
        return None;
    }
    let total = rows.len();
    let parent_impurity = gini(parent_counts, total);
    let mut best: Option<(f64, usize, usize)> = None;

    for feature_idx in sample(rng, n_features, grid.mtry.min(n_features)).into_iter() {
        let mut hist = vec![vec![0usize; grid.n_classes]; grid.bins];
        for &row in rows {
            let b = grid.binned[row].get(feature_idx).copied().unwrap_or(0) as usize;
            hist[b.min(grid.bins - 1)][grid.y[row]] += 1;
        }
        let mut left = vec![0usize; grid.n_classes];
        let mut left_total = 0usize;
        for (split_bin, bin_counts) in hist.iter().enumerate().take(grid.bins - 1) {
            for (acc, &c) in left.iter_mut().zip(bin_counts) {
                *acc += c;
            }
            left_total += bin_counts.iter().sum::<usize>();
            let right_total = total - left_total;
            if left_total == 0 || right_total == 0 {
                continue;
            }
            let right: Vec<usize> = parent_counts
                .iter()
                .zip(&left)
                .map(|(&p, &l)| p - l)
                .collect();
            let weighted = (left_total as f64 * gini(&left, left_total)
                + right_total as f64 * gini(&right, right_total))
                / total as f64;
            if best.is_none_or(|(score, _, _)| weighted < score) {
                best = Some((weighted, feature_idx, split_bin));
            }
        }
    }

    let (score, feature_idx, split_bin) = best?;
    if score >= parent_impurity - 1e-12 {
        return None;
    }
    let threshold = threshold_for_bin(grid.mins[feature_idx], grid.maxs[feature_idx], split_bin, grid.bins);
    Some((feature_idx, threshold))
}

fn compute_feature_min_max(x: &[Vec<f32>], feature_len: usize) -> (Vec<f32>, Vec<f32>) {
    let mut mins = vec![f32::INFINITY; feature_len];
    let mut maxs = vec![f32::NEG_INFINITY; feature_len];
    for row in x {
        for (j, &v) in row.iter().take(feature_len).enumerate() {
            if v.is_finite() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
    }
    for j in 0..feature_len {
        if !mins[j].is_finite() || !maxs[j].is_finite() {
            mins[j] = 0.0;
            maxs[j] = 0.0;
        }
        if mins[j] == maxs[j] {
            maxs[j] = mins[j] + 1.0;
        }
    }
    (mins, maxs)
}

fn bin_features(x: &[Vec<f32>], mins: &[f32], maxs: &[f32], bins: usize) -> Vec<Vec<u8>> {
    let bins = bins.clamp(2, 256) as f32;
    let mut out: Vec<Vec<u8>> = Vec::with_capacity(x.len());
    for row in x {
        let mut binned = Vec::with_capacity(mins.len());
        for (j, &min) in mins.iter().enumerate() {
            let max = maxs[j];
            let v = row.get(j).copied().unwrap_or(0.0);
            let t = if max > min && v.is_finite() {
                ((v - min) / (max - min)).clamp(0.0, 1.0)
            } else {
                0.0
            };
            binned.push((t * (bins - 1.0)).round() as u8);
        }
        out.push(binned);
    }
    out
}

/// Upper edge of `split_bin` in feature units; bin `b` holds values rounding to `b`.
fn threshold_for_bin(min: f32, max: f32, split_bin: usize, bins: usize) -> f32 {
    let t = (split_bin as f32 + 0.5) / (bins - 1) as f32;
    min + t * (max - min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(n_per_class: usize) -> TrainDataset {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..n_per_class {
            let jitter = (i % 7) as f32 * 0.05;
            x.push(vec![0.1 + jitter, 5.0, 1.0 - jitter]);
            y.push(0);
            x.push(vec![2.0 + jitter, 5.0, -1.0 + jitter]);
            y.push(1);
        }
        TrainDataset {
            feature_len_f32: 3,
            feat_version: 1,
            classes: vec!["inner".into(), "normal".into()],
            x,
            y,
        }
    }

    #[test]
    fn separable_blobs_are_learned() {
        let dataset = blobs(30);
        let options = ForestOptions {
            n_trees: 10,
            ..ForestOptions::default()
        };
        let model = train_random_forest(&dataset, &options).unwrap();
        model.validate().unwrap();
        assert_eq!(model.trees.len(), 10);
        assert_eq!(model.predict_class_index(&[0.2, 5.0, 0.9]), 0);
        assert_eq!(model.predict_class_index(&[2.1, 5.0, -0.9]), 1);
    }

    #[test]
    fn same_seed_same_model() {
        let dataset = blobs(20);
        let options = ForestOptions {
            n_trees: 5,
            ..ForestOptions::default()
        };
        let a = train_random_forest(&dataset, &options).unwrap();
        let b = train_random_forest(&dataset, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn max_depth_is_respected() {
        let dataset = blobs(40);
        let options = ForestOptions {
            n_trees: 3,
            max_depth: 1,
            ..ForestOptions::default()
        };
        let model = train_random_forest(&dataset, &options).unwrap();
        assert!(model.trees.iter().all(|tree| tree.depth() <= 1));
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let mut dataset = blobs(2);
        dataset.classes.truncate(1);
        assert!(train_random_forest(&dataset, &ForestOptions::default()).is_err());
        let bad = ForestOptions {
            bins: 1,
            ..ForestOptions::default()
        };
        assert!(bad.validate().is_err());
    }
}
