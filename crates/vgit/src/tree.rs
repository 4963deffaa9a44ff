//! File tree projection of a flat tracked-file list.

use serde::Serialize;

/// A directory: a name and its children in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tree {
    pub name: String,
    pub children: Vec<Node>,
}

/// A tree child. Serialises as `{"name", "children"}` for directories and a
/// bare string for files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Dir(Tree),
    File(String),
}

impl Tree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Child directory named `name`, ignoring files of the same name.
    pub fn dir(&self, name: &str) -> Option<&Self> {
        self.children.iter().find_map(|c| match c {
            Node::Dir(t) if t.name == name => Some(t),
            _ => None,
        })
    }

    /// Names of the direct file children.
    pub fn files(&self) -> Vec<&str> {
        self.children
            .iter()
            .filter_map(|c| match c {
                Node::File(f) => Some(f.as_str()),
                Node::Dir(_) => None,
            })
            .collect()
    }
}

/// Directory under construction. Children refer to other folders by index,
/// so a directory and a file with the same name can never alias.
struct Folder {
    name: String,
    children: Vec<Slot>,
}

enum Slot {
    Folder(usize),
    File(String),
}

/// Fold `/`-separated paths into a tree rooted at `"root"`.
///
/// Directories are matched by exact segment name, first match wins, and
/// appear where they were first discovered.
pub fn build_tree<S: AsRef<str>>(files: &[S]) -> Tree {
    let mut arena = vec![Folder {
        name: "root".to_string(),
        children: Vec::new(),
    }];

    for file in files {
        let mut segments: Vec<&str> = file.as_ref().split('/').collect();
        let leaf = segments.pop().unwrap_or_default();

        let mut cur = 0;
        for segment in segments {
            let existing = arena[cur].children.iter().find_map(|slot| match slot {
                Slot::Folder(i) if arena[*i].name == segment => Some(*i),
                _ => None,
            });
            cur = if let Some(i) = existing {
                i
            } else {
                let i = arena.len();
                arena.push(Folder {
                    name: segment.to_string(),
                    children: Vec::new(),
                });
                arena[cur].children.push(Slot::Folder(i));
                i
            };
        }

        arena[cur].children.push(Slot::File(leaf.to_string()));
    }

    // Children always sit at higher indices than their parent, so building
    // from the back means every child is finished before its parent.
    let mut built: Vec<Option<Tree>> = Vec::with_capacity(arena.len());
    built.resize_with(arena.len(), || None);
    for (idx, folder) in arena.into_iter().enumerate().rev() {
        let children = folder
            .children
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Folder(i) => built[i].take().map(Node::Dir),
                Slot::File(f) => Some(Node::File(f)),
            })
            .collect();
        built[idx] = Some(Tree {
            name: folder.name,
            children,
        });
    }

    built
        .into_iter()
        .next()
        .flatten()
        .unwrap_or_else(|| Tree::new("root"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn discovery_order_and_nesting() {
        let tree = build_tree(&["src/a.js", "index.js"]);
        assert_eq!(tree.name, "root");
        assert_eq!(
            tree.children,
            vec![
                Node::Dir(Tree {
                    name: "src".into(),
                    children: vec![Node::File("a.js".into())],
                }),
                Node::File("index.js".into()),
            ]
        );
    }

    #[test]
    fn empty_listing_is_bare_root() {
        let tree = build_tree::<&str>(&[]);
        assert_eq!(tree, Tree::new("root"));
    }

    #[test]
    fn directories_are_shared() {
        let tree = build_tree(&["a/b/1.txt", "a/2.txt", "a/b/3.txt", "c.txt"]);
        let a = tree.dir("a").unwrap();
        assert_eq!(a.children.len(), 2);
        assert_eq!(a.dir("b").unwrap().files(), vec!["1.txt", "3.txt"]);
        assert_eq!(a.files(), vec!["2.txt"]);
        assert_eq!(tree.files(), vec!["c.txt"]);
    }

    #[test]
    fn folder_and_file_with_same_name_stay_distinct() {
        // `x` is a file at the root and also a directory under `y/`; `y/x`
        // as a leaf must not be confused with the `y/x/` directory.
        let tree = build_tree(&["x", "y/x", "y/x/z.txt"]);
        assert_eq!(tree.files(), vec!["x"]);
        assert!(tree.dir("x").is_none());

        let y = tree.dir("y").unwrap();
        assert_eq!(y.files(), vec!["x"]);
        assert_eq!(y.dir("x").unwrap().files(), vec!["z.txt"]);
    }

    #[test]
    fn case_sensitive_segments() {
        let tree = build_tree(&["Docs/a", "docs/b"]);
        assert_eq!(tree.children.len(), 2);
    }

    #[test]
    fn idempotent() {
        let files = ["b/c/d.txt", "a.txt", "b/e.txt"];
        assert_eq!(build_tree(&files), build_tree(&files));
    }

    #[test]
    fn json_shape() {
        let tree = build_tree(&["src/a.js", "index.js"]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "root",
                "children": [
                    {"name": "src", "children": ["a.js"]},
                    "index.js"
                ]
            })
        );
    }
}
