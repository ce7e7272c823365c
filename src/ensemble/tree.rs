//! CART decision trees stored as a flat node arena.
//!
//! Classification trees split on Gini impurity and keep a class
//! distribution per leaf. Regression trees split on squared error and keep
//! a scalar per leaf; boosting supplies the leaf value.

use serde::{Deserialize, Serialize};

use super::random::RandomSource;

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features considered per split; `None` considers all of them.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node<L> {
    Leaf(L),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree<L> {
    nodes: Vec<Node<L>>,
}

impl<L> Tree<L> {
    /// Leaf reached by `x`. Values `<= threshold` go left.
    pub fn leaf(&self, x: &[f64]) -> &L {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = x.get(*feature).copied().unwrap_or(0.0);
                    at = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Replace every leaf value, keeping the split structure.
    pub fn map_leaves<M>(self, mut f: impl FnMut(L) -> M) -> Tree<M> {
        Tree {
            nodes: self
                .nodes
                .into_iter()
                .map(|node| match node {
                    Node::Leaf(value) => Node::Leaf(f(value)),
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    },
                })
                .collect(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Split targets
// ═══════════════════════════════════════════════════════════

/// What a tree is fitted against: sufficient statistics that can be
/// updated one sample at a time while sweeping thresholds.
pub trait SplitTarget {
    type Leaf;
    type Stats: Clone;

    fn empty(&self) -> Self::Stats;
    fn add(&self, stats: &mut Self::Stats, sample: usize);
    fn remove(&self, stats: &mut Self::Stats, sample: usize);
    /// Impurity of a node scaled by its size; lower is purer.
    fn cost(&self, stats: &Self::Stats) -> f64;
    fn leaf(&self, samples: &[usize]) -> Self::Leaf;
}

/// Class labels, Gini impurity, leaf = class distribution.
pub struct ClassTarget<'a> {
    pub labels: &'a [usize],
    pub n_classes: usize,
}

impl SplitTarget for ClassTarget<'_> {
    type Leaf = Vec<f64>;
    type Stats = (Vec<f64>, f64);

    fn empty(&self) -> Self::Stats {
        (vec![0.0; self.n_classes], 0.0)
    }

    fn add(&self, stats: &mut Self::Stats, sample: usize) {
        stats.0[self.labels[sample]] += 1.0;
        stats.1 += 1.0;
    }

    fn remove(&self, stats: &mut Self::Stats, sample: usize) {
        stats.0[self.labels[sample]] -= 1.0;
        stats.1 -= 1.0;
    }

    fn cost(&self, (counts, total): &Self::Stats) -> f64 {
        if *total <= 0.0 {
            return 0.0;
        }
        let sum_sq: f64 = counts.iter().map(|c| c * c).sum();
        total - sum_sq / total
    }

    fn leaf(&self, samples: &[usize]) -> Vec<f64> {
        let mut dist = vec![0.0; self.n_classes];
        for &i in samples {
            dist[self.labels[i]] += 1.0;
        }
        let n = samples.len().max(1) as f64;
        dist.iter_mut().for_each(|p| *p /= n);
        dist
    }
}

/// Real-valued targets, squared error, leaf = mean target.
pub struct ValueTarget<'a> {
    pub values: &'a [f64],
}

impl SplitTarget for ValueTarget<'_> {
    type Leaf = f64;
    // (count, sum, sum of squares)
    type Stats = (f64, f64, f64);

    fn empty(&self) -> Self::Stats {
        (0.0, 0.0, 0.0)
    }

    fn add(&self, s: &mut Self::Stats, sample: usize) {
        let v = self.values[sample];
        s.0 += 1.0;
        s.1 += v;
        s.2 += v * v;
    }

    fn remove(&self, s: &mut Self::Stats, sample: usize) {
        let v = self.values[sample];
        s.0 -= 1.0;
        s.1 -= v;
        s.2 -= v * v;
    }

    fn cost(&self, (n, sum, sum_sq): &Self::Stats) -> f64 {
        if *n <= 0.0 {
            return 0.0;
        }
        (sum_sq - sum * sum / n).max(0.0)
    }

    fn leaf(&self, samples: &[usize]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|&i| self.values[i]).sum::<f64>() / samples.len() as f64
    }
}

// ═══════════════════════════════════════════════════════════
// Growth
// ═══════════════════════════════════════════════════════════

const MIN_GAIN: f64 = 1e-12;

/// Grow a tree over `samples` (row indices into `features`).
pub fn grow<T: SplitTarget>(
    features: &[Vec<f64>],
    samples: Vec<usize>,
    target: &T,
    params: TreeParams,
    rng: &mut dyn RandomSource,
) -> Tree<T::Leaf> {
    let mut nodes = Vec::new();
    let n_features = features.first().map(|row| row.len()).unwrap_or(0);
    build(
        &mut nodes, features, n_features, samples, target, params, 0, rng,
    );
    Tree { nodes }
}

#[allow(clippy::too_many_arguments)]
fn build<T: SplitTarget>(
    nodes: &mut Vec<Node<T::Leaf>>,
    features: &[Vec<f64>],
    n_features: usize,
    samples: Vec<usize>,
    target: &T,
    params: TreeParams,
    depth: usize,
    rng: &mut dyn RandomSource,
) -> usize {
    let at = nodes.len();
    let can_split = depth < params.max_depth
        && samples.len() >= params.min_samples_split.max(2)
        && n_features > 0;

    let split = if can_split {
        best_split(features, n_features, &samples, target, params, rng)
    } else {
        None
    };

    let Some((feature, threshold)) = split else {
        nodes.push(Node::Leaf(target.leaf(&samples)));
        return at;
    };

    let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
        .into_iter()
        .partition(|&i| features[i][feature] <= threshold);

    // Placeholder, patched once both children exist.
    nodes.push(Node::Split {
        feature,
        threshold,
        left: 0,
        right: 0,
    });
    let left = build(
        nodes, features, n_features, left_samples, target, params, depth + 1, rng,
    );
    let right = build(
        nodes, features, n_features, right_samples, target, params, depth + 1, rng,
    );
    nodes[at] = Node::Split {
        feature,
        threshold,
        left,
        right,
    };
    at
}

fn best_split<T: SplitTarget>(
    features: &[Vec<f64>],
    n_features: usize,
    samples: &[usize],
    target: &T,
    params: TreeParams,
    rng: &mut dyn RandomSource,
) -> Option<(usize, f64)> {
    let mut parent = target.empty();
    for &i in samples {
        target.add(&mut parent, i);
    }
    let parent_cost = target.cost(&parent);
    if parent_cost <= MIN_GAIN {
        return None;
    }

    let candidates: Vec<usize> = match params.max_features {
        Some(k) if k < n_features => rng.sample_distinct(n_features, k.max(1)),
        _ => (0..n_features).collect(),
    };

    let mut best: Option<(usize, f64, f64)> = None;
    let mut order = samples.to_vec();
    for feature in candidates {
        order.sort_by(|&a, &b| features[a][feature].total_cmp(&features[b][feature]));

        let mut left = target.empty();
        let mut right = parent.clone();
        for k in 0..order.len() - 1 {
            let sample = order[k];
            target.add(&mut left, sample);
            target.remove(&mut right, sample);

            let here = features[sample][feature];
            let next = features[order[k + 1]][feature];
            if here >= next {
                continue;
            }
            let cost = target.cost(&left) + target.cost(&right);
            if best.map_or(true, |(_, _, c)| cost < c) {
                best = Some((feature, (here + next) / 2.0, cost));
            }
        }
    }

    best.filter(|(_, _, cost)| parent_cost - cost > MIN_GAIN)
        .map(|(feature, threshold, _)| (feature, threshold))
}
