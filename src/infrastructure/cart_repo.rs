use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::{Cart, CartStatus, NewCart, NewCartItem, Product};
use crate::domain::errors::DomainError;
use crate::domain::ports::CartRepository;
use crate::schema::{cart_items, carts, products};

use super::models::{CartItemRow, CartRow, NewCartItemRow, NewCartRow, ProductRow};

pub struct DieselCartRepository {
    pool: DbPool,
}

impl DieselCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn load_cart(conn: &mut PgConnection, id: Uuid) -> Result<Option<Cart>, DomainError> {
    let cart = carts::table
        .find(id)
        .select(CartRow::as_select())
        .first(conn)
        .optional()?;
    let Some(cart) = cart else {
        return Ok(None);
    };

    let items = cart_items::table
        .inner_join(products::table)
        .filter(cart_items::cart_id.eq(id))
        .order(cart_items::created_at.asc())
        .select((CartItemRow::as_select(), ProductRow::as_select()))
        .load::<(CartItemRow, ProductRow)>(conn)?
        .into_iter()
        .map(|(item, product)| item.into_domain(product))
        .collect();

    cart.into_domain(items).map(Some)
}

fn touch(conn: &mut PgConnection, cart_id: Uuid) -> QueryResult<usize> {
    diesel::update(carts::table.find(cart_id))
        .set(carts::updated_at.eq(Utc::now()))
        .execute(conn)
}

impl CartRepository for DieselCartRepository {
    fn create(&self, cart: NewCart) -> Result<Cart, DomainError> {
        let mut conn = self.pool.get()?;
        let row = diesel::insert_into(carts::table)
            .values(&NewCartRow {
                id: cart.id,
                user_id: cart.user_id,
                session_id: cart.session_id,
                status: CartStatus::Active.as_str().to_string(),
                expires_at: cart.expires_at,
            })
            .returning(CartRow::as_returning())
            .get_result(&mut conn)?;
        row.into_domain(vec![])
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, DomainError> {
        let mut conn = self.pool.get()?;
        load_cart(&mut conn, id)
    }

    fn find_product(&self, id: Uuid) -> Result<Option<Product>, DomainError> {
        let mut conn = self.pool.get()?;
        let row = products::table
            .find(id)
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(Product::from))
    }

    fn add_item(&self, item: NewCartItem) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            diesel::insert_into(cart_items::table)
                .values(&NewCartItemRow {
                    id: item.id,
                    cart_id: item.cart_id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    delivery_option: item.delivery_option,
                    warranty_option: item.warranty_option,
                })
                .execute(conn)?;
            touch(conn, item.cart_id)?;
            Ok(())
        })
    }

    fn set_item_quantity(&self, cart_id: Uuid, item_id: Uuid, quantity: i32) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(
                cart_items::table
                    .filter(cart_items::id.eq(item_id))
                    .filter(cart_items::cart_id.eq(cart_id)),
            )
            .set(cart_items::quantity.eq(quantity))
            .execute(conn)?;
            if updated > 0 {
                touch(conn, cart_id)?;
            }
            Ok(updated > 0)
        })
    }

    fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let deleted = diesel::delete(
                cart_items::table
                    .filter(cart_items::id.eq(item_id))
                    .filter(cart_items::cart_id.eq(cart_id)),
            )
            .execute(conn)?;
            if deleted > 0 {
                touch(conn, cart_id)?;
            }
            Ok(deleted > 0)
        })
    }
}
