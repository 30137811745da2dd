//! Document hierarchy reconstruction.
//!
//! Turns the flat page list into an ordered forest. Directory nesting is
//! the authoritative parent signal; an explicitly declared parent is used
//! only when no nesting hint exists. Pages whose parent is missing from
//! the set are promoted to roots rather than dropped.

use std::collections::{HashMap, HashSet};

use crate::error::{AppError, Result};
use crate::models::SourcePage;

/// A page with its resolved place in the forest.
#[derive(Debug, Clone)]
pub struct PageNode {
    pub page: SourcePage,
    /// Resolved parent source id; `None` for roots
    pub parent: Option<String>,
    /// Distance from the root of this page's tree
    pub depth: usize,
}

/// Build the ordered forest from a flat page list.
///
/// The returned order is a stable sort by `(depth, title)`, which preserves
/// archive enumeration order within ties and guarantees every parent
/// appears strictly before its children.
pub fn build_tree(pages: Vec<SourcePage>) -> Result<Vec<PageNode>> {
    let ids: HashSet<String> = pages.iter().map(|p| p.source_id.clone()).collect();

    let mut parents: HashMap<String, String> = HashMap::new();
    for page in &pages {
        let hint = page.dir_parent.as_ref().or(page.declared_parent.as_ref());
        let Some(hint) = hint else { continue };

        if let (Some(dir), Some(declared)) = (&page.dir_parent, &page.declared_parent) {
            if dir != declared {
                log::debug!(
                    "{}: declared parent {} disagrees with nesting {}; using nesting",
                    page.source_id,
                    declared,
                    dir
                );
            }
        }

        if !ids.contains(hint) {
            log::warn!(
                "{}: parent {} not found in export; promoting to root",
                page.source_id,
                hint
            );
            continue;
        }
        if *hint == page.source_id {
            return Err(AppError::structure(format!(
                "page {} declares itself as its own parent",
                page.source_id
            )));
        }
        parents.insert(page.source_id.clone(), hint.clone());
    }

    let mut nodes: Vec<PageNode> = Vec::with_capacity(pages.len());
    for page in pages {
        let depth = resolve_depth(&page.source_id, &parents)?;
        let parent = parents.get(&page.source_id).cloned();
        nodes.push(PageNode {
            page,
            parent,
            depth,
        });
    }

    nodes.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| a.page.title.cmp(&b.page.title))
    });
    Ok(nodes)
}

/// Walk ancestors to find a node's depth, failing on cycles.
fn resolve_depth(id: &str, parents: &HashMap<String, String>) -> Result<usize> {
    let mut seen = HashSet::new();
    let mut current = id;
    let mut depth = 0;
    while let Some(parent) = parents.get(current) {
        if !seen.insert(current.to_string()) {
            return Err(AppError::structure(format!(
                "parent cycle detected involving {id}"
            )));
        }
        current = parent;
        depth += 1;
    }
    Ok(depth)
}
