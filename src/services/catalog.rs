//! Catalog: categories with aggregated product counts, and products.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::aggregates::{Category, CategoryForest, CategoryNode, Product, ProductDraft};
use crate::domain::value_objects::{CategoryId, ProductId};
use crate::store::{Store, UnitOfWork};
use crate::{Result, ShopError};

/// Fields an administrator supplies for a category.
#[derive(Clone, Debug)]
pub struct CategoryDraft {
    pub name: String,
    /// Derived from the name on create, kept as it is on update, when absent.
    pub slug: Option<String>,
    /// `None` leaves the parent untouched, `Some(None)` makes the category a root.
    pub parent_id: Option<Option<CategoryId>>,
}

impl CategoryDraft {
    fn slug(&self) -> Option<String> {
        self.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
    }
}

pub(crate) fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

/// Forest of every category plus the aggregated totals, read in one unit of work.
async fn snapshot(uow: &mut dyn UnitOfWork) -> Result<(CategoryForest, std::collections::HashMap<CategoryId, u64>)> {
    let forest = CategoryForest::new(uow.list_categories().await?);
    let direct = uow.product_counts().await?;
    let totals = forest.totals(&direct);
    Ok((forest, totals))
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Every category, each carrying its own subtree.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<CategoryNode>> {
        let mut uow = self.store.begin().await?;
        let (forest, totals) = snapshot(&mut *uow).await?;
        Ok(forest.nodes(&forest.all_ids(), &totals))
    }

    #[instrument(skip(self))]
    pub async fn root_categories(&self) -> Result<Vec<CategoryNode>> {
        let mut uow = self.store.begin().await?;
        let (forest, totals) = snapshot(&mut *uow).await?;
        Ok(forest.nodes(forest.roots(), &totals))
    }

    #[instrument(skip(self))]
    pub async fn category_count(&self) -> Result<u64> {
        let mut uow = self.store.begin().await?;
        Ok(uow.list_categories().await?.len() as u64)
    }

    #[instrument(skip(self))]
    pub async fn category(&self, id: CategoryId) -> Result<CategoryNode> {
        let mut uow = self.store.begin().await?;
        let (forest, totals) = snapshot(&mut *uow).await?;
        forest.node(id, &totals).ok_or_else(|| ShopError::not_found("Category", id))
    }

    #[instrument(skip(self))]
    pub async fn category_by_slug(&self, slug: &str) -> Result<CategoryNode> {
        let mut uow = self.store.begin().await?;
        let (forest, totals) = snapshot(&mut *uow).await?;
        forest
            .by_slug(slug)
            .and_then(|c| forest.node(c.id, &totals))
            .ok_or_else(|| ShopError::NotFound(format!("Category with slug '{slug}' not found")))
    }

    /// Direct children of a category, each with its subtree.
    #[instrument(skip(self))]
    pub async fn subcategories(&self, parent: CategoryId) -> Result<Vec<CategoryNode>> {
        let mut uow = self.store.begin().await?;
        let (forest, totals) = snapshot(&mut *uow).await?;
        if forest.get(parent).is_none() {
            return Err(ShopError::not_found("Category", parent));
        }
        Ok(forest.nodes(forest.children(parent), &totals))
    }

    #[instrument(skip(self))]
    pub async fn create_category(&self, draft: CategoryDraft) -> Result<CategoryNode> {
        let mut uow = self.store.begin().await?;
        let (forest, _) = snapshot(&mut *uow).await?;
        let category = Category {
            id: CategoryId::generate(),
            name: draft.name.trim().to_string(),
            slug: draft.slug().unwrap_or_else(|| slugify(&draft.name)),
            parent_id: draft.parent_id.flatten(),
        };
        Self::check_category(&forest, &category)?;
        uow.insert_category(&category).await?;
        let (forest, totals) = snapshot(&mut *uow).await?;
        uow.commit().await?;

        info!(category = %category.id, slug = %category.slug, "category created");
        forest.node(category.id, &totals).ok_or_else(|| ShopError::not_found("Category", category.id))
    }

    /// Renames the category. Slug and parent change only when the draft carries them.
    #[instrument(skip(self))]
    pub async fn update_category(&self, id: CategoryId, draft: CategoryDraft) -> Result<CategoryNode> {
        let mut uow = self.store.begin().await?;
        let (forest, _) = snapshot(&mut *uow).await?;
        let current = forest.get(id).ok_or_else(|| ShopError::not_found("Category", id))?;
        let category = Category {
            id,
            name: draft.name.trim().to_string(),
            slug: draft.slug().unwrap_or_else(|| current.slug.clone()),
            parent_id: draft.parent_id.unwrap_or(current.parent_id),
        };
        Self::check_category(&forest, &category)?;
        uow.update_category(&category).await?;
        let (forest, totals) = snapshot(&mut *uow).await?;
        uow.commit().await?;

        info!(category = %id, "category updated");
        forest.node(id, &totals).ok_or_else(|| ShopError::not_found("Category", id))
    }

    /// Refused while subcategories or products still point at the category.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        let mut uow = self.store.begin().await?;
        let (forest, _) = snapshot(&mut *uow).await?;
        if forest.get(id).is_none() {
            return Err(ShopError::not_found("Category", id));
        }
        if !forest.children(id).is_empty() {
            return Err(ShopError::BadRequest("Categories with subcategories cannot be deleted".into()));
        }
        if uow.product_counts().await?.get(&id).copied().unwrap_or(0) > 0 {
            return Err(ShopError::BadRequest("Categories that still hold products cannot be deleted".into()));
        }
        uow.delete_category(id).await?;
        uow.commit().await?;
        info!(category = %id, "category deleted");
        Ok(())
    }

    fn check_category(forest: &CategoryForest, category: &Category) -> Result<()> {
        if category.name.is_empty() {
            return Err(ShopError::BadRequest("Category name is required".into()));
        }
        if category.slug.is_empty() {
            return Err(ShopError::BadRequest("Category slug is required".into()));
        }
        if forest.by_slug(&category.slug).is_some_and(|other| other.id != category.id) {
            return Err(ShopError::Conflict(format!("Category with slug '{}' already exists", category.slug)));
        }
        if let Some(parent) = category.parent_id {
            if parent == category.id {
                return Err(ShopError::BadRequest("A category cannot be its own parent".into()));
            }
            if forest.get(parent).is_none() {
                return Err(ShopError::not_found("Category", parent));
            }
            if forest.is_within(parent, category.id) {
                return Err(ShopError::BadRequest("A category cannot be moved below one of its descendants".into()));
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn products(&self, category: Option<CategoryId>) -> Result<Vec<Product>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.list_products(category).await?)
    }

    #[instrument(skip(self))]
    pub async fn product(&self, id: ProductId) -> Result<Product> {
        let mut uow = self.store.begin().await?;
        uow.find_product(id).await?.ok_or_else(|| ShopError::not_found("Product", id))
    }

    #[instrument(skip(self))]
    pub async fn product_by_slug(&self, slug: &str) -> Result<Product> {
        let mut uow = self.store.begin().await?;
        uow.find_product_by_slug(slug)
            .await?
            .ok_or_else(|| ShopError::NotFound(format!("Product with slug '{slug}' not found")))
    }

    #[instrument(skip(self))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product> {
        let mut uow = self.store.begin().await?;
        Self::check_product(&mut *uow, &draft, None).await?;
        let product = Product::create(draft)?;
        uow.insert_product(&product).await?;
        uow.commit().await?;
        info!(product = %product.id, slug = %product.slug, price = %product.price, "product created");
        Ok(product)
    }

    /// Price changes here never reach orders already placed.
    #[instrument(skip(self))]
    pub async fn update_product(&self, id: ProductId, draft: ProductDraft) -> Result<Product> {
        let mut uow = self.store.begin().await?;
        let mut product = uow.find_product(id).await?.ok_or_else(|| ShopError::not_found("Product", id))?;
        Self::check_product(&mut *uow, &draft, Some(id)).await?;
        product.revise(draft)?;
        uow.update_product(&product).await?;
        uow.commit().await?;
        info!(product = %id, price = %product.price, "product updated");
        Ok(product)
    }

    /// Products whose name contains `term`, ignoring case. A blank term matches nothing.
    #[instrument(skip(self))]
    pub async fn search_products(&self, term: &str) -> Result<Vec<Product>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let mut uow = self.store.begin().await?;
        Ok(uow.search_products(term).await?)
    }

    #[instrument(skip(self))]
    pub async fn product_count(&self) -> Result<u64> {
        let mut uow = self.store.begin().await?;
        Ok(uow.product_counts().await?.values().sum())
    }

    /// Removes the product from the catalog and from every cart. Refused once an
    /// order line was priced from it.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut uow = self.store.begin().await?;
        if uow.find_product(id).await?.is_none() {
            return Err(ShopError::not_found("Product", id));
        }
        if uow.product_is_ordered(id).await? {
            return Err(ShopError::BadRequest("Products that appear in orders cannot be deleted".into()));
        }
        uow.delete_product(id).await?;
        uow.commit().await?;
        info!(product = %id, "product deleted");
        Ok(())
    }

    async fn check_product(uow: &mut dyn UnitOfWork, draft: &ProductDraft, id: Option<ProductId>) -> Result<()> {
        if uow.find_product_by_slug(&draft.slug).await?.is_some_and(|other| Some(other.id) != id) {
            return Err(ShopError::Conflict(format!("Product with slug '{}' already exists", draft.slug)));
        }
        let known = uow.list_categories().await?.iter().any(|c| c.id == draft.category_id);
        if !known {
            return Err(ShopError::not_found("Category", draft.category_id));
        }
        Ok(())
    }
}
