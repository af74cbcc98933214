//! Category tree and product-count aggregation.
//!
//! Categories reference their parent by id. [`CategoryForest`] keeps them in an
//! arena keyed by id with a separate child index, so totals and nested views are
//! produced with explicit stacks instead of recursion over parent pointers.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use crate::domain::value_objects::CategoryId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
}

/// Category as returned to clients: its subtree plus the number of products
/// filed under it or any descendant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
    pub parent_name: Option<String>,
    pub subcategories: Vec<CategoryNode>,
    pub total_products: u64,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryForest {
    arena: HashMap<CategoryId, Category>,
    children: HashMap<CategoryId, Vec<CategoryId>>,
    roots: Vec<CategoryId>,
}

impl CategoryForest {
    /// Children and roots are ordered by name, then slug.
    pub fn new(categories: Vec<Category>) -> Self {
        let mut sorted = categories;
        sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.slug.cmp(&b.slug)));

        let known: HashSet<CategoryId> = sorted.iter().map(|c| c.id).collect();
        let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
        let mut roots = Vec::new();
        for c in &sorted {
            match c.parent_id {
                Some(parent) if known.contains(&parent) => children.entry(parent).or_default().push(c.id),
                _ => roots.push(c.id),
            }
        }
        let arena = sorted.into_iter().map(|c| (c.id, c)).collect();
        Self { arena, children, roots }
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> { self.arena.get(&id) }
    pub fn roots(&self) -> &[CategoryId] { &self.roots }

    pub fn children(&self, id: CategoryId) -> &[CategoryId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn by_slug(&self, slug: &str) -> Option<&Category> {
        self.arena.values().find(|c| c.slug == slug)
    }

    /// Every category, ordered by name.
    pub fn all_ids(&self) -> Vec<CategoryId> {
        let mut ids: Vec<&Category> = self.arena.values().collect();
        ids.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.slug.cmp(&b.slug)));
        ids.into_iter().map(|c| c.id).collect()
    }

    /// True when `node` is `ancestor` itself or sits anywhere below it.
    pub fn is_within(&self, node: CategoryId, ancestor: CategoryId) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor { return true; }
            if !seen.insert(id) { return false; }
            cursor = self.arena.get(&id).and_then(|c| c.parent_id);
        }
        false
    }

    /// Aggregated product count of every category: its own products plus the
    /// totals of all its children. A node is never entered twice, so corrupt
    /// (cyclic) parent links cannot loop forever.
    pub fn totals(&self, direct: &HashMap<CategoryId, u64>) -> HashMap<CategoryId, u64> {
        let mut totals: HashMap<CategoryId, u64> = HashMap::with_capacity(self.arena.len());
        let mut entered: HashSet<CategoryId> = HashSet::with_capacity(self.arena.len());
        for &start in self.roots.iter().chain(self.arena.keys()) {
            let mut stack = vec![(start, false)];
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    let below: u64 = self.children(id).iter().filter_map(|c| totals.get(c)).sum();
                    totals.insert(id, direct.get(&id).copied().unwrap_or(0) + below);
                } else if entered.insert(id) {
                    stack.push((id, true));
                    stack.extend(self.children(id).iter().filter(|c| !entered.contains(*c)).map(|c| (*c, false)));
                }
            }
        }
        totals
    }

    /// Nested view rooted at `id`, or `None` if the category is unknown.
    pub fn node(&self, id: CategoryId, totals: &HashMap<CategoryId, u64>) -> Option<CategoryNode> {
        self.arena.get(&id)?;
        let mut built: HashMap<CategoryId, CategoryNode> = HashMap::new();
        let mut entered = HashSet::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                let subcategories = self.children(current).iter().filter_map(|c| built.remove(c)).collect();
                if let Some(node) = self.shallow(current, subcategories, totals) {
                    built.insert(current, node);
                }
            } else if entered.insert(current) {
                stack.push((current, true));
                stack.extend(self.children(current).iter().filter(|c| !entered.contains(*c)).map(|c| (*c, false)));
            }
        }
        built.remove(&id)
    }

    pub fn nodes(&self, ids: &[CategoryId], totals: &HashMap<CategoryId, u64>) -> Vec<CategoryNode> {
        ids.iter().filter_map(|id| self.node(*id, totals)).collect()
    }

    fn shallow(&self, id: CategoryId, subcategories: Vec<CategoryNode>, totals: &HashMap<CategoryId, u64>) -> Option<CategoryNode> {
        let c = self.arena.get(&id)?;
        Some(CategoryNode {
            id: c.id,
            name: c.name.clone(),
            slug: c.slug.clone(),
            parent_id: c.parent_id,
            parent_name: c.parent_id.and_then(|p| self.arena.get(&p)).map(|p| p.name.clone()),
            subcategories,
            total_products: totals.get(&id).copied().unwrap_or(0),
        })
    }
}
