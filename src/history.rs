//! Read-only access to candidates' product-effectiveness history.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{EffectiveProduct, StoreError};

/// Supplies the products a candidate has empirically found effective.
///
/// The matching core treats this store as read-only.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn effective_products(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<EffectiveProduct>, StoreError>;
}

/// In-memory history backend.
pub struct InMemoryHistoryStore {
    products: RwLock<HashMap<Uuid, Vec<EffectiveProduct>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_products(&self, candidate_id: Uuid, products: Vec<EffectiveProduct>) {
        let mut map = self.products.write().await;
        map.insert(candidate_id, products);
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn effective_products(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<EffectiveProduct>, StoreError> {
        let map = self.products.read().await;
        Ok(map.get(&candidate_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_candidate_has_no_products() {
        let store = InMemoryHistoryStore::new();
        let products = store.effective_products(Uuid::new_v4()).await.unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn set_products_roundtrip() {
        let store = InMemoryHistoryStore::new();
        let candidate = Uuid::new_v4();
        let product = EffectiveProduct {
            product_id: Uuid::new_v4(),
            name: "gentle cleanser".into(),
            category: "cleanser".into(),
            effectiveness: 0.9,
        };
        store.set_products(candidate, vec![product.clone()]).await;

        let products = store.effective_products(candidate).await.unwrap();
        assert_eq!(products, vec![product]);
    }
}
