//! Registry of tradable products
//!
//! Loaded once during startup and shared read-only afterwards. There is no
//! way to add or remove a product after construction, so readers never need
//! a lock and never see a partially populated registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::errors::ProductRegistryError;
use crate::ids::ProductId;

/// Immutable set of valid product identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRegistry {
    products: BTreeSet<ProductId>,
}

impl ProductRegistry {
    /// Build a registry from already-parsed identifiers.
    ///
    /// Fails on an empty list; a hub with no products can serve nothing.
    pub fn new(
        products: impl IntoIterator<Item = ProductId>,
    ) -> Result<Arc<Self>, ProductRegistryError> {
        let products: BTreeSet<ProductId> = products.into_iter().collect();
        if products.is_empty() {
            return Err(ProductRegistryError::Empty);
        }
        Ok(Arc::new(Self { products }))
    }

    /// Parse a comma-separated list such as `BTC-USD,ETH-USD`.
    pub fn parse(list: &str) -> Result<Arc<Self>, ProductRegistryError> {
        let mut products = Vec::new();
        for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let id = ProductId::try_new(raw)
                .ok_or_else(|| ProductRegistryError::InvalidProduct(raw.to_string()))?;
            products.push(id);
        }
        Self::new(products)
    }

    /// Whether the identifier names a tradable product.
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.products.contains(product_id)
    }

    /// Look up a product by its string form.
    pub fn get(&self, symbol: &str) -> Option<&ProductId> {
        self.products.iter().find(|p| p.as_str() == symbol)
    }

    /// All products in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &ProductId> {
        self.products.iter()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
