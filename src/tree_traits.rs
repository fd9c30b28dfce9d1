//! Text rendering of vessel hierarchies

use termtree::Tree;
use tracing::instrument;

use crate::domain::{VascularTree, VesselIndex};

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

impl TreeNodeConvert for VascularTree {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self) -> Tree<String> {
        fn label(tree: &VascularTree, idx: VesselIndex) -> String {
            tree.vessel(idx).map_or_else(
                || "?".to_string(),
                |v| format!("#{} r={:.4e} q={:.4e} l={:.3}", v.id, v.radius(), v.flow(), v.length()),
            )
        }

        fn build_tree(tree: &VascularTree, idx: VesselIndex, parent: &mut Tree<String>) {
            for &child in tree.children(idx) {
                let mut child_tree = Tree::new(label(tree, child));
                build_tree(tree, child, &mut child_tree);
                parent.push(child_tree);
            }
        }

        match self.root() {
            Some(root) => {
                let mut rendered = Tree::new(label(self, root));
                build_tree(self, root, &mut rendered);
                rendered
            }
            None => Tree::new("Empty tree".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HydraulicLaws, Point, TreeParameters, VesselOptions};

    #[test]
    fn given_empty_tree_when_rendering_then_placeholder() {
        let tree = VascularTree::new(TreeParameters::default(), HydraulicLaws::default()).unwrap();
        assert_eq!(tree.to_tree_string().to_string().trim(), "Empty tree");
    }

    #[test]
    fn given_bifurcation_when_rendering_then_one_line_per_vessel() {
        let mut tree = VascularTree::new(TreeParameters::default(), HydraulicLaws::default()).unwrap();
        let root = tree.set_root(Point::new(2.0, 0.0, 0.0), &VesselOptions::default()).unwrap();
        tree.bifurcate(root, 0, Point::new(1.0, 0.0, 0.0), Point::new(1.0, 1.0, 0.0), &VesselOptions::default())
            .unwrap();
        let rendered = tree.to_tree_string().to_string();
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.starts_with("#0"));
    }
}
