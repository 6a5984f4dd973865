//! Categories: the folder-like tree entities are filed into

use serde::{Deserialize, Serialize};

use super::facet::Facet;
use super::ids::CategoryId;
use super::Aggregate;

/// Name given to the root category when it is first created
pub const ROOT_CATEGORY_NAME: &str = "root";

/// A node of the category tree
///
/// Exactly one category, the root, has no parent. Every other category
/// must be attached to a parent before it can be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent: Option<CategoryId>,
    sub_categories: Vec<CategoryId>,
    pub facet: Facet,
}

impl Category {
    /// Create a detached category with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: CategoryId::new(),
            facet: Facet::new(name.clone()),
            name,
            parent: None,
            sub_categories: Vec::new(),
        }
    }

    /// Create the root category
    pub fn root() -> Self {
        Self {
            id: CategoryId::ROOT,
            ..Self::new(ROOT_CATEGORY_NAME)
        }
    }

    /// Rebuild a category from its stored parts
    pub(crate) fn restore(
        id: CategoryId,
        name: String,
        parent: Option<CategoryId>,
        sub_categories: Vec<CategoryId>,
        facet: Facet,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            sub_categories,
            facet,
        }
    }

    /// Whether this is the root category
    pub fn is_root(&self) -> bool {
        self.id == CategoryId::ROOT
    }

    /// Ids of the direct sub-categories, in order
    pub fn sub_categories(&self) -> &[CategoryId] {
        &self.sub_categories
    }

    /// Attach `child` below this category
    pub fn add_sub_category(&mut self, child: &mut Category) {
        child.parent = Some(self.id);
        if !self.sub_categories.contains(&child.id) {
            self.sub_categories.push(child.id);
        }
    }

    /// Detach a sub-category by id, returning whether it was attached
    pub fn remove_sub_category(&mut self, id: CategoryId) -> bool {
        let before = self.sub_categories.len();
        self.sub_categories.retain(|c| *c != id);
        self.sub_categories.len() != before
    }

    /// This category's facet followed by its ancestors' facets, nearest first
    ///
    /// `ancestors` starts with the parent and ends with the root.
    pub fn facets<'a>(&'a self, ancestors: &'a [Category]) -> Vec<&'a Facet> {
        std::iter::once(&self.facet)
            .chain(ancestors.iter().map(|c| &c.facet))
            .collect()
    }
}

impl Aggregate for Category {
    type Id = CategoryId;
    const KIND: &'static str = "Category";

    fn id(&self) -> CategoryId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_category() {
        let root = Category::root();
        assert!(root.is_root());
        assert_eq!(root.parent, None);
        assert_eq!(root.name, ROOT_CATEGORY_NAME);
        assert!(!Category::new("other").is_root());
    }

    #[test]
    fn test_sub_category_attachment() {
        let mut parent = Category::new("parent");
        let mut child = Category::new("child");

        parent.add_sub_category(&mut child);
        parent.add_sub_category(&mut child);

        assert_eq!(child.parent, Some(parent.id));
        assert_eq!(parent.sub_categories(), &[child.id]);

        assert!(parent.remove_sub_category(child.id));
        assert!(!parent.remove_sub_category(child.id));
        assert!(parent.sub_categories().is_empty());
    }

    #[test]
    fn test_facets_nearest_first() {
        let root = Category::root();
        let mut mid = Category::new("mid");
        let mut leaf = Category::new("leaf");
        let mut root_clone = root.clone();
        root_clone.add_sub_category(&mut mid);
        mid.add_sub_category(&mut leaf);

        let ancestors = vec![mid.clone(), root.clone()];
        let names: Vec<_> = leaf.facets(&ancestors).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["leaf", "mid", "root"]);
    }
}
