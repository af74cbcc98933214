//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{CategoryId, Money, ProductId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Money,
    pub image_url: Option<String>,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an administrator supplies for a product. Used for both create and update.
#[derive(Clone, Debug)]
pub struct ProductDraft {
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Money,
    pub image_url: Option<String>,
    pub featured: bool,
}

impl Product {
    pub fn create(draft: ProductDraft) -> Result<Self, ProductError> {
        draft.check()?;
        let now = Utc::now();
        Ok(Self {
            id: ProductId::generate(), category_id: draft.category_id, name: draft.name.trim().to_string(),
            slug: draft.slug, description: draft.description, price: draft.price,
            image_url: draft.image_url, featured: draft.featured, created_at: now, updated_at: now,
        })
    }

    /// Replaces the editable fields. Past orders are unaffected by a price change.
    pub fn revise(&mut self, draft: ProductDraft) -> Result<(), ProductError> {
        draft.check()?;
        self.category_id = draft.category_id;
        self.name = draft.name.trim().to_string();
        self.slug = draft.slug;
        self.description = draft.description;
        self.price = draft.price;
        self.image_url = draft.image_url;
        self.featured = draft.featured;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl ProductDraft {
    fn check(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.price.is_negative() { return Err(ProductError::NegativePrice); }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { MissingName, NegativePrice }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::MissingName => write!(f, "Product name is required"), Self::NegativePrice => write!(f, "Price cannot be negative") }
    }
}
