//! Category tree and slug path resolution.
//!
//! Categories are loaded once at startup and frozen into a [`CategoryTree`].
//! Shop URLs address categories by up to three slug segments
//! (`/shop/{root}/{child}/{leaf}`), and product queries are scoped to the
//! deepest resolved category and everything beneath it.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::CategoryId;

/// Maximum depth of the category tree in this shop.
pub const MAX_DEPTH: usize = 3;

/// A category row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Category {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub slug: String,
    pub name: String,
}

/// Category lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CategoryError {
    /// A category (or a parent it points at) does not exist.
    #[error("category {0} not found")]
    NotFound(CategoryId),
    /// Parent pointers loop back on themselves.
    #[error("category {0} has a cyclic parent chain")]
    Cycle(CategoryId),
}

/// Which categories a product query is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryScope {
    /// No category filter.
    Unscoped,
    /// Only products in these categories.
    Only(BTreeSet<CategoryId>),
}

impl CategoryScope {
    /// Ids to bind into `category_id = ANY($1)`, or `None` when unscoped.
    #[must_use]
    pub fn ids(&self) -> Option<Vec<CategoryId>> {
        match self {
            Self::Unscoped => None,
            Self::Only(ids) => Some(ids.iter().copied().collect()),
        }
    }
}

/// Immutable snapshot of all categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    by_id: HashMap<CategoryId, Category>,
    children: HashMap<Option<CategoryId>, Vec<CategoryId>>,
}

impl CategoryTree {
    /// Freeze a flat category list into a tree.
    ///
    /// Children keep the order of the input list. A category whose parent is
    /// missing is still stored, so [`Self::full_ancestor_path`] can report the
    /// dangling pointer.
    #[must_use]
    pub fn build(categories: Vec<Category>) -> Self {
        let mut children: HashMap<Option<CategoryId>, Vec<CategoryId>> = HashMap::new();
        for category in &categories {
            children
                .entry(category.parent_id)
                .or_default()
                .push(category.id);
        }
        let by_id = categories.into_iter().map(|c| (c.id, c)).collect();
        Self { by_id, children }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.by_id.get(&id)
    }

    /// Top-level categories.
    pub fn roots(&self) -> impl Iterator<Item = &Category> {
        self.children_of(None)
    }

    /// Direct children of `id`.
    pub fn children(&self, id: CategoryId) -> impl Iterator<Item = &Category> {
        self.children_of(Some(id))
    }

    fn children_of(&self, parent: Option<CategoryId>) -> impl Iterator<Item = &Category> {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
    }

    /// Resolve up to three slug segments into categories, root first.
    ///
    /// Each segment must name a direct child of the previous match. The chain
    /// stops at the first segment that does not resolve, so the result may be
    /// shorter than the input.
    #[must_use]
    pub fn resolve_slug_path(
        &self,
        first: &str,
        second: Option<&str>,
        third: Option<&str>,
    ) -> Vec<&Category> {
        let segments = std::iter::once(Some(first))
            .chain([second, third])
            .map_while(|segment| segment);

        let mut resolved = Vec::with_capacity(MAX_DEPTH);
        let mut parent = None;
        for slug in segments {
            let Some(category) = self.children_of(parent).find(|c| c.slug == slug) else {
                break;
            };
            parent = Some(category.id);
            resolved.push(category);
        }
        resolved
    }

    /// Category ids a product query should be restricted to.
    ///
    /// Nothing resolved means no filter. A fully resolved leaf scopes to just
    /// itself. Otherwise the deepest resolved category and its whole subtree
    /// are included.
    #[must_use]
    pub fn descendant_ids(&self, resolved: &[&Category]) -> CategoryScope {
        let Some(deepest) = resolved.last() else {
            return CategoryScope::Unscoped;
        };

        let mut ids = BTreeSet::from([deepest.id]);
        if resolved.len() >= MAX_DEPTH {
            return CategoryScope::Only(ids);
        }

        let mut pending = vec![deepest.id];
        while let Some(id) = pending.pop() {
            for child in self.children(id) {
                if ids.insert(child.id) {
                    pending.push(child.id);
                }
            }
        }
        CategoryScope::Only(ids)
    }

    /// Walk parent pointers from `id` up to its root, returned root first.
    ///
    /// # Errors
    ///
    /// [`CategoryError::NotFound`] when `id` or any parent it references is
    /// missing, [`CategoryError::Cycle`] when the chain never reaches a root.
    pub fn full_ancestor_path(&self, id: CategoryId) -> Result<Vec<&Category>, CategoryError> {
        let mut path = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if path.len() > self.by_id.len() {
                return Err(CategoryError::Cycle(id));
            }
            let category = self.get(current).ok_or(CategoryError::NotFound(current))?;
            path.push(category);
            next = category.parent_id;
        }
        path.reverse();
        Ok(path)
    }
}
