//! Directory view over the flat list of entry names.

use std::collections::HashMap;

use super::archive::Archive;

/// A direct child of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub is_dir: bool,
}

/// Map from directory path (`""` is the root) to its children, in the order
/// they were first seen.
#[derive(Debug, Default)]
pub struct DirTree {
    dirs: HashMap<String, Vec<TreeNode>>,
}

impl DirTree {
    /// Build the tree from normalized entry names. Every ancestor of every
    /// name is registered as a directory.
    pub fn build<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut tree = DirTree::default();
        for name in names {
            tree.insert(name, false);
        }
        tree
    }

    /// Build the tree for an archive, honouring explicit directory entries.
    pub fn from_archive(archive: &Archive) -> Self {
        let mut tree = DirTree::default();
        for entry in archive.entries() {
            tree.insert(&entry.name, entry.is_dir);
        }
        tree
    }

    fn insert(&mut self, name: &str, is_dir: bool) {
        if name.is_empty() {
            return;
        }
        let mut child_is_dir = is_dir;
        let mut path = name;
        loop {
            let (parent, leaf) = match path.rfind('/') {
                Some(i) => (&path[..i], &path[i + 1..]),
                None => ("", path),
            };

            let children = self.dirs.entry(parent.to_string()).or_default();
            match children.iter_mut().find(|c| c.name == leaf) {
                Some(existing) => existing.is_dir |= child_is_dir,
                None => children.push(TreeNode {
                    name: leaf.to_string(),
                    is_dir: child_is_dir,
                }),
            }
            if child_is_dir {
                self.dirs.entry(path.to_string()).or_default();
            }

            if parent.is_empty() {
                break;
            }
            path = parent;
            child_is_dir = true;
        }
    }

    /// Children of `dir`, or `None` if no such directory exists.
    pub fn children(&self, dir: &str) -> Option<&[TreeNode]> {
        self.dirs.get(dir.trim_matches('/')).map(Vec::as_slice)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains_key(path.trim_matches('/'))
    }

    /// Depth-first walk from the root, yielding `(depth, path, node)`.
    pub fn walk(&self) -> Vec<(usize, String, &TreeNode)> {
        let mut out = Vec::new();
        self.walk_into("", 0, &mut out);
        out
    }

    fn walk_into<'s>(&'s self, dir: &str, depth: usize, out: &mut Vec<(usize, String, &'s TreeNode)>) {
        let Some(children) = self.dirs.get(dir) else {
            return;
        };
        for child in children {
            let path = if dir.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", dir, child.name)
            };
            out.push((depth, path.clone(), child));
            if child.is_dir {
                self.walk_into(&path, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(nodes: &[TreeNode]) -> Vec<(&str, bool)> {
        nodes.iter().map(|n| (n.name.as_str(), n.is_dir)).collect()
    }

    #[test]
    fn registers_every_ancestor() {
        let tree = DirTree::build(["index.php", "src/a.php", "src/lib/b.php", "src/c.php"]);

        assert_eq!(
            names(tree.children("").unwrap()),
            vec![("index.php", false), ("src", true)]
        );
        assert_eq!(
            names(tree.children("src").unwrap()),
            vec![("a.php", false), ("lib", true), ("c.php", false)]
        );
        assert_eq!(names(tree.children("src/lib").unwrap()), vec![("b.php", false)]);
        assert!(tree.is_dir("src/lib"));
        assert!(!tree.is_dir("src/a.php"));
        assert!(tree.children("nope").is_none());
    }

    #[test]
    fn walk_is_depth_first() {
        let tree = DirTree::build(["a/b/c.txt", "d.txt"]);
        let paths: Vec<_> = tree.walk().into_iter().map(|(d, p, _)| (d, p)).collect();
        assert_eq!(
            paths,
            vec![
                (0, "a".to_string()),
                (1, "a/b".to_string()),
                (2, "a/b/c.txt".to_string()),
                (0, "d.txt".to_string()),
            ]
        );
    }
}
