//! Parsers for git's textual listings.

use std::collections::HashMap;
use std::path::PathBuf;

/// Which `git branch` listing produced the text; decides how remote-tracking
/// prefixes are stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchListing {
    /// `git branch`
    Local,
    /// `git branch -r`: every entry is `<remote>/<name>`.
    Remote,
    /// `git branch -a`: remote entries are `remotes/<remote>/<name>`.
    All,
}

/// Extract short branch names from `git branch` output.
///
/// Skips blank lines, `->` alias lines and detached-HEAD entries, drops the
/// two-character marker column (`* `, `+ `), strips remote prefixes and
/// de-duplicates by short name in first-seen order.
pub fn extract_branch_names(output: &str, listing: BranchListing) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() || line.contains("->") {
            continue;
        }

        let entry = line.get(2..).unwrap_or_default().trim();
        if entry.starts_with('(') {
            continue;
        }

        let name = match listing {
            BranchListing::Local => Some(entry),
            BranchListing::Remote => strip_remote(entry),
            BranchListing::All => match entry.strip_prefix("remotes/") {
                Some(remote) => strip_remote(remote),
                None => Some(entry),
            },
        };

        let Some(name) = name.filter(|n| !n.is_empty()) else {
            continue;
        };

        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    names
}

fn strip_remote(entry: &str) -> Option<&str> {
    entry.split_once('/').map(|(_, name)| name)
}

/// Parse `git worktree list --porcelain` into branch short-name → path.
///
/// A `branch` line belongs to the most recent `worktree` line. Detached and
/// bare worktrees have no `branch` line and are left out.
pub fn parse_worktrees(output: &str) -> HashMap<String, PathBuf> {
    let mut worktrees = HashMap::new();
    let mut current: Option<PathBuf> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            current = Some(PathBuf::from(path));
        } else if let Some(branch) = line.strip_prefix("branch ") {
            let name = branch.strip_prefix("refs/heads/").unwrap_or(branch);
            if let Some(path) = &current {
                worktrees.insert(name.to_string(), path.clone());
            }
        } else if line.is_empty() {
            current = None;
        }
    }

    worktrees
}

/// Split `git ls-files -z` output.
pub fn parse_files(output: &str) -> Vec<String> {
    output
        .split('\0')
        .filter(|f| !f.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_listing_skips_head_alias_and_dedupes() {
        let output = "* main\n  remotes/origin/HEAD -> origin/main\n  remotes/origin/main\n  remotes/origin/feature\n";
        assert_eq!(
            extract_branch_names(output, BranchListing::All),
            vec!["main", "feature"]
        );
    }

    #[test]
    fn remote_listing_strips_remote_name() {
        let output = "  origin/HEAD -> origin/main\n  origin/main\n  upstream/main\n  origin/feat/login\n";
        assert_eq!(
            extract_branch_names(output, BranchListing::Remote),
            vec!["main", "feat/login"]
        );
    }

    #[test]
    fn local_listing_keeps_slashes() {
        let output = "  feat/login\n* main\n+ other-worktree\n\n";
        assert_eq!(
            extract_branch_names(output, BranchListing::Local),
            vec!["feat/login", "main", "other-worktree"]
        );
    }

    #[test]
    fn detached_head_is_skipped() {
        let output = "* (HEAD detached at 1a2b3c4)\n  main\n";
        assert_eq!(
            extract_branch_names(output, BranchListing::Local),
            vec!["main"]
        );
    }

    #[test]
    fn empty_listing() {
        assert!(extract_branch_names("", BranchListing::All).is_empty());
    }

    #[test]
    fn worktrees_pair_branch_with_latest_path() {
        let output = "worktree /repo\nHEAD 1111111111111111111111111111111111111111\nbranch refs/heads/main\n\n\
worktree /repo/.worktrees/feat/login\nHEAD 2222222222222222222222222222222222222222\nbranch refs/heads/feat/login\n\n\
worktree /tmp/detached\nHEAD 3333333333333333333333333333333333333333\ndetached\n\n";
        let map = parse_worktrees(output);
        assert_eq!(map.len(), 2);
        assert_eq!(map["main"], PathBuf::from("/repo"));
        assert_eq!(map["feat/login"], PathBuf::from("/repo/.worktrees/feat/login"));
    }

    #[test]
    fn branch_without_worktree_line_is_ignored() {
        assert!(parse_worktrees("branch refs/heads/main\n").is_empty());
    }

    #[test]
    fn files_split_on_nul() {
        assert_eq!(
            parse_files("src/a.js\0index.js\0dir with space/ü.txt\0"),
            vec!["src/a.js", "index.js", "dir with space/ü.txt"]
        );
        assert!(parse_files("").is_empty());
    }
}
