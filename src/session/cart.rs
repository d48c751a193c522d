//! Cart Store
//!
//! Per-session shopping cart, a hash of item -> quantity keyed by session
//! token. Lives and dies with the session: the reaper clears carts when it
//! runs in full-cleanup mode.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::store::OrderedStore;

/// Per-session cart hash (item -> quantity).
pub(crate) fn cart_key(token: &str) -> String {
    format!("cart:{}", token)
}

/// Per-session item-quantity store.
pub struct CartStore {
    store: Arc<dyn OrderedStore>,
}

impl CartStore {
    /// Create a cart store over the given store.
    pub fn new(store: Arc<dyn OrderedStore>) -> Self {
        Self { store }
    }

    /// Set the quantity of an item in a session's cart. A quantity of zero
    /// or less removes the item.
    #[instrument(skip(self), fields(token = %token))]
    pub async fn set_quantity(&self, token: &str, item: &str, quantity: i64) -> Result<()> {
        let key = cart_key(token);
        if quantity <= 0 {
            self.store.hdel(&key, &[item.to_string()]).await?;
        } else {
            self.store.hset(&key, item, &quantity.to_string()).await?;
        }
        Ok(())
    }

    /// The full cart for a session. Entries whose stored quantity does not
    /// parse are skipped rather than failing the whole read.
    pub async fn get_cart(&self, token: &str) -> Result<HashMap<String, u64>> {
        let raw = self.store.hgetall(&cart_key(token)).await?;

        let mut cart = HashMap::with_capacity(raw.len());
        for (item, quantity) in raw {
            match quantity.parse::<u64>() {
                Ok(q) => {
                    cart.insert(item, q);
                }
                Err(_) => {
                    warn!(
                        token,
                        item = %item,
                        quantity = %quantity,
                        "skipping unparseable cart quantity"
                    );
                }
            }
        }
        Ok(cart)
    }

    /// Remove a session's entire cart.
    pub async fn clear(&self, token: &str) -> Result<()> {
        self.store.del(&[cart_key(token)]).await?;
        Ok(())
    }

    /// Remove the carts of many sessions. Per-token failures are collected
    /// into the first error, after attempting every token.
    pub async fn clear_batch(&self, tokens: &[String]) -> Result<()> {
        let results = join_all(tokens.iter().map(|t| self.clear(t))).await;
        for result in results {
            result?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn make_carts() -> (CartStore, Arc<dyn OrderedStore>) {
        let store: Arc<dyn OrderedStore> = Arc::new(MemoryStore::new());
        (CartStore::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_add_and_read_cart() {
        let (carts, _) = make_carts();

        carts.set_quantity("tok", "itemY", 3).await.unwrap();
        carts.set_quantity("tok", "itemZ", 1).await.unwrap();

        let cart = carts.get_cart("tok").await.unwrap();
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.get("itemY"), Some(&3));
    }

    #[tokio::test]
    async fn test_zero_quantity_removes_item() {
        let (carts, _) = make_carts();

        carts.set_quantity("tok", "itemY", 3).await.unwrap();
        carts.set_quantity("tok", "itemY", 0).await.unwrap();

        assert!(carts.get_cart("tok").await.unwrap().is_empty());

        // Negative quantities behave the same, and removing a missing item
        // is not an error.
        carts.set_quantity("tok", "itemY", -4).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_overwrites_quantity() {
        let (carts, _) = make_carts();

        carts.set_quantity("tok", "itemY", 3).await.unwrap();
        carts.set_quantity("tok", "itemY", 7).await.unwrap();

        let cart = carts.get_cart("tok").await.unwrap();
        assert_eq!(cart.get("itemY"), Some(&7));
    }

    #[tokio::test]
    async fn test_unparseable_quantity_is_skipped() {
        let (carts, store) = make_carts();

        store
            .hset(&cart_key("tok"), "itemY", "not-a-number")
            .await
            .unwrap();
        store.hset(&cart_key("tok"), "itemZ", "2").await.unwrap();

        let cart = carts.get_cart("tok").await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get("itemZ"), Some(&2));
    }

    #[tokio::test]
    async fn test_clear_batch() {
        let (carts, _) = make_carts();

        carts.set_quantity("tok-1", "itemY", 3).await.unwrap();
        carts.set_quantity("tok-2", "itemZ", 1).await.unwrap();

        carts
            .clear_batch(&["tok-1".to_string(), "tok-2".to_string()])
            .await
            .unwrap();

        assert!(carts.get_cart("tok-1").await.unwrap().is_empty());
        assert!(carts.get_cart("tok-2").await.unwrap().is_empty());
    }
}
