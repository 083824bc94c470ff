use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::run_blocking;
use crate::domain::cart::{
    validate_option, validate_quantity, Cart, NewCart, NewCartItem, MAX_ITEM_QUANTITY,
};
use crate::domain::errors::DomainError;
use crate::domain::ports::CartRepository;

#[derive(Debug, Clone)]
pub struct AddItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub delivery_option: Option<Value>,
    pub warranty_option: Option<Value>,
}

#[derive(Clone)]
pub struct CartService {
    repo: Arc<dyn CartRepository>,
    ttl: Duration,
}

impl CartService {
    pub fn new(repo: Arc<dyn CartRepository>, ttl_hours: i64) -> Self {
        Self {
            repo,
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub async fn create_cart(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<Cart, DomainError> {
        let repo = Arc::clone(&self.repo);
        let cart = NewCart {
            id: Uuid::new_v4(),
            user_id,
            session_id: session_id.filter(|s| !s.trim().is_empty()),
            expires_at: Utc::now() + self.ttl,
        };
        let cart = run_blocking(move || repo.create(cart)).await?;
        log::info!("Created cart {}", cart.id);
        Ok(cart)
    }

    pub async fn get_cart(&self, id: Uuid) -> Result<Cart, DomainError> {
        let repo = Arc::clone(&self.repo);
        run_blocking(move || repo.find_by_id(id))
            .await?
            .ok_or_else(|| DomainError::not_found("Cart"))
    }

    /// Adds a product line; the same product with identical options is
    /// merged into the existing line.
    pub async fn add_item(&self, cart_id: Uuid, input: AddItem) -> Result<Cart, DomainError> {
        validate_quantity(input.quantity)?;
        validate_option(input.delivery_option.as_ref(), "delivery_option")?;
        validate_option(input.warranty_option.as_ref(), "warranty_option")?;

        let repo = Arc::clone(&self.repo);
        run_blocking(move || {
            let cart = repo
                .find_by_id(cart_id)?
                .ok_or_else(|| DomainError::not_found("Cart"))?;
            cart.ensure_usable(Utc::now())?;

            let product = repo
                .find_product(input.product_id)?
                .ok_or_else(|| DomainError::not_found("Product"))?;
            if !product.is_active {
                return Err(DomainError::InvalidInput(format!(
                    "product {} is not available",
                    product.sku
                )));
            }

            let existing = cart.matching_item(
                product.id,
                input.delivery_option.as_ref(),
                input.warranty_option.as_ref(),
            );
            match existing {
                Some(item) => {
                    let quantity = item.quantity + input.quantity;
                    if quantity > MAX_ITEM_QUANTITY {
                        return Err(DomainError::validation(
                            "quantity",
                            format!("cannot exceed {MAX_ITEM_QUANTITY} per line"),
                        ));
                    }
                    repo.set_item_quantity(cart_id, item.id, quantity)?;
                }
                None => repo.add_item(NewCartItem {
                    id: Uuid::new_v4(),
                    cart_id,
                    product_id: product.id,
                    quantity: input.quantity,
                    unit_price: product.price.clone(),
                    delivery_option: input.delivery_option,
                    warranty_option: input.warranty_option,
                })?,
            }

            repo.find_by_id(cart_id)?
                .ok_or_else(|| DomainError::not_found("Cart"))
        })
        .await
    }

    /// Sets a line's quantity; zero removes the line.
    pub async fn update_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, DomainError> {
        if quantity != 0 {
            validate_quantity(quantity)?;
        }
        let repo = Arc::clone(&self.repo);
        run_blocking(move || {
            let cart = repo
                .find_by_id(cart_id)?
                .ok_or_else(|| DomainError::not_found("Cart"))?;
            cart.ensure_usable(Utc::now())?;

            let found = if quantity == 0 {
                repo.remove_item(cart_id, item_id)?
            } else {
                repo.set_item_quantity(cart_id, item_id, quantity)?
            };
            if !found {
                return Err(DomainError::not_found("Cart item"));
            }
            repo.find_by_id(cart_id)?
                .ok_or_else(|| DomainError::not_found("Cart"))
        })
        .await
    }

    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<Cart, DomainError> {
        self.update_item(cart_id, item_id, 0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;
    use serde_json::json;

    fn service(store: &Arc<InMemoryStore>) -> CartService {
        CartService::new(store.clone(), 24)
    }

    #[tokio::test]
    async fn add_item_prices_from_catalog_and_merges_lines() {
        let store = InMemoryStore::new();
        let product = store.add_product("SKU-1", "Oven", "399.00", Some("4006381333931"));
        let carts = service(&store);
        let cart = carts.create_cart(None, Some("sess-1".to_string())).await.unwrap();

        let add = AddItem {
            product_id: product.id,
            quantity: 1,
            delivery_option: None,
            warranty_option: Some(json!({"code": "G3-2Y", "price": "39.00"})),
        };
        carts.add_item(cart.id, add.clone()).await.unwrap();
        let cart = carts.add_item(cart.id, add).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.items[0].unit_price, product.price);
    }

    #[tokio::test]
    async fn different_options_make_separate_lines() {
        let store = InMemoryStore::new();
        let product = store.add_product("SKU-1", "Oven", "399.00", None);
        let carts = service(&store);
        let cart = carts.create_cart(None, None).await.unwrap();

        for warranty in [None, Some(json!({"code": "G3", "price": "10"}))] {
            carts
                .add_item(
                    cart.id,
                    AddItem {
                        product_id: product.id,
                        quantity: 1,
                        delivery_option: None,
                        warranty_option: warranty,
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(carts.get_cart(cart.id).await.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn inactive_or_missing_products_are_rejected() {
        let store = InMemoryStore::new();
        let product = store.add_product("OLD", "Discontinued", "10.00", None);
        store.deactivate_product(product.id);
        let carts = service(&store);
        let cart = carts.create_cart(None, None).await.unwrap();

        let err = carts
            .add_item(
                cart.id,
                AddItem {
                    product_id: product.id,
                    quantity: 1,
                    delivery_option: None,
                    warranty_option: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        let err = carts
            .add_item(
                cart.id,
                AddItem {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                    delivery_option: None,
                    warranty_option: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn zero_quantity_removes_line() {
        let store = InMemoryStore::new();
        let product = store.add_product("SKU", "Hob", "120.00", None);
        let carts = service(&store);
        let cart = carts.create_cart(None, None).await.unwrap();
        let cart = carts
            .add_item(
                cart.id,
                AddItem {
                    product_id: product.id,
                    quantity: 3,
                    delivery_option: None,
                    warranty_option: None,
                },
            )
            .await
            .unwrap();
        let item_id = cart.items[0].id;

        let cart = carts.update_item(cart.id, item_id, 0).await.unwrap();
        assert!(cart.items.is_empty());

        let err = carts.remove_item(cart.id, item_id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_cart_is_not_found() {
        let store = InMemoryStore::new();
        let err = service(&store).get_cart(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
