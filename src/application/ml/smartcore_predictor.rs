use super::predictor::Estimator;
use serde::Deserialize;
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// SmartCore random forest head.
///
/// `forest` is the regressor exactly as `serde_json::to_value(&model)` emits it
/// after `RandomForestRegressor::fit`. smartcore indexes the input matrix
/// without bounds checks of its own, so the tree layout is inspected before the
/// forest is accepted.
#[derive(Deserialize)]
#[serde(try_from = "ForestDocument")]
pub struct ForestHead {
    pub n_features: usize,
    /// Highest split feature index plus one, over every tree.
    split_width: usize,
    tree_count: usize,
    forest: Forest,
}

#[derive(Deserialize)]
struct ForestDocument {
    n_features: usize,
    forest: serde_json::Value,
}

// Mirrors of smartcore's serialized layout, only the fields traversal reads
#[derive(Deserialize)]
struct ForestShape {
    forest_regressor: Option<TreeList>,
}

#[derive(Deserialize)]
struct TreeList {
    trees: Option<Vec<TreeShape>>,
}

#[derive(Deserialize)]
struct TreeShape {
    nodes: Vec<NodeShape>,
}

#[derive(Deserialize)]
struct NodeShape {
    split_feature: usize,
    true_child: Option<usize>,
    false_child: Option<usize>,
}

impl TreeShape {
    /// Checks that traversal stays in bounds and terminates; returns the
    /// split width of this tree.
    fn split_width(&self, tree: usize) -> Result<usize, String> {
        if self.nodes.is_empty() {
            return Err(format!("tree {} has no nodes", tree));
        }
        let mut width = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            match (node.true_child, node.false_child) {
                (None, None) => {}
                (Some(t), Some(f)) => {
                    for child in [t, f] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(format!(
                                "tree {} node {} has invalid child {}",
                                tree, i, child
                            ));
                        }
                    }
                    width = width.max(node.split_feature + 1);
                }
                _ => return Err(format!("tree {} node {} has a single child", tree, i)),
            }
        }
        Ok(width)
    }
}

impl TryFrom<ForestDocument> for ForestHead {
    type Error = String;

    fn try_from(doc: ForestDocument) -> Result<Self, Self::Error> {
        let shape = ForestShape::deserialize(&doc.forest)
            .map_err(|e| format!("unrecognised forest layout: {}", e))?;
        let trees = shape
            .forest_regressor
            .and_then(|f| f.trees)
            .unwrap_or_default();

        let mut split_width = 0;
        for (i, tree) in trees.iter().enumerate() {
            split_width = split_width.max(tree.split_width(i)?);
        }

        let forest: Forest =
            serde_json::from_value(doc.forest).map_err(|e| format!("forest: {}", e))?;

        Ok(Self {
            n_features: doc.n_features,
            split_width,
            tree_count: trees.len(),
            forest,
        })
    }
}

impl Estimator for ForestHead {
    fn input_width(&self) -> usize {
        self.n_features
    }

    fn estimate(&self, features: &[f64]) -> Result<f64, String> {
        let input_matrix = DenseMatrix::from_2d_vec(&vec![features.to_vec()])
            .map_err(|e| format!("Matrix creation failed: {}", e))?;

        let predictions = self
            .forest
            .predict(&input_matrix)
            .map_err(|e| format!("Prediction failed: {}", e))?;

        predictions
            .first()
            .copied()
            .ok_or_else(|| "No prediction returned".to_string())
    }

    fn validate(&self) -> Result<(), String> {
        if self.n_features == 0 {
            return Err("n_features must be positive".to_string());
        }
        if self.tree_count == 0 {
            return Err("forest has no trees".to_string());
        }
        if self.split_width > self.n_features {
            return Err(format!(
                "forest splits on feature {} but n_features is {}",
                self.split_width - 1,
                self.n_features
            ));
        }
        Ok(())
    }
}
