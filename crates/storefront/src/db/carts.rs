//! Cart storage.

use chrono::{DateTime, Utc};
use sqlx::Connection;
use uuid::Uuid;

use emporium_core::{CartId, ProductId, UserId};

use super::{PgStore, RepositoryError};
use crate::models::{CartLineDetail, CartOwner};
use crate::store::CartStore;

impl CartStore for PgStore {
    async fn user_cart_ids(&mut self, user: UserId) -> Result<Vec<CartId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, CartId>("SELECT id FROM carts WHERE user_id = $1")
            .bind(user)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(ids)
    }

    async fn replace_user_carts(&mut self, user: UserId) -> Result<CartId, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        sqlx::query("DELETE FROM carts WHERE user_id = $1")
            .bind(user)
            .execute(&mut *tx)
            .await?;

        let id = sqlx::query_scalar::<_, CartId>(
            "INSERT INTO carts (user_id, last_modified_at) VALUES ($1, now()) RETURNING id",
        )
        .bind(user)
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from_unique)?;

        tx.commit().await?;
        Ok(id)
    }

    async fn anonymous_cart_id(&mut self, token: Uuid) -> Result<Option<CartId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, CartId>("SELECT id FROM carts WHERE uuid = $1")
            .bind(token)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(id)
    }

    async fn create_anonymous_cart(&mut self, token: Uuid) -> Result<CartId, RepositoryError> {
        let id = sqlx::query_scalar::<_, CartId>(
            "INSERT INTO carts (uuid, last_modified_at) VALUES ($1, now()) RETURNING id",
        )
        .bind(token)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(RepositoryError::from_unique)?;
        Ok(id)
    }

    async fn find_cart(&mut self, owner: CartOwner) -> Result<Option<CartId>, RepositoryError> {
        match owner {
            CartOwner::User(user) => {
                let id = sqlx::query_scalar::<_, CartId>(
                    "SELECT id FROM carts WHERE user_id = $1 ORDER BY id LIMIT 1",
                )
                .bind(user)
                .fetch_optional(&mut *self.conn)
                .await?;
                Ok(id)
            }
            CartOwner::Anonymous(token) => self.anonymous_cart_id(token).await,
        }
    }

    async fn cart_modified_at(
        &mut self,
        cart: CartId,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_modified_at FROM carts WHERE id = $1",
        )
        .bind(cart)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(at)
    }

    async fn line_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<i32>, RepositoryError> {
        let quantity = sqlx::query_scalar::<_, i32>(
            "SELECT quantity FROM cart_products WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart)
        .bind(product)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(quantity)
    }

    async fn line_details(&mut self, cart: CartId) -> Result<Vec<CartLineDetail>, RepositoryError> {
        let lines = sqlx::query_as::<_, CartLineDetail>(
            r"
            SELECT cp.product_id, p.name, cp.quantity, p.price_net, p.vat_rate, p.stock
            FROM cart_products cp
            JOIN products p ON p.id = cp.product_id
            WHERE cp.cart_id = $1
            ORDER BY cp.added_at, cp.product_id
            ",
        )
        .bind(cart)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(lines)
    }

    async fn set_line_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.conn.begin().await?;

        sqlx::query(
            r"
            INSERT INTO cart_products (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(cart)
        .bind(product)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
        stamp(&mut tx, cart).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_line(&mut self, cart: CartId, product: ProductId) -> Result<(), RepositoryError> {
        let mut tx = self.conn.begin().await?;

        sqlx::query("DELETE FROM cart_products WHERE cart_id = $1 AND product_id = $2")
            .bind(cart)
            .bind(product)
            .execute(&mut *tx)
            .await?;
        stamp(&mut tx, cart).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear_cart(&mut self, cart: CartId) -> Result<u64, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let removed = sqlx::query("DELETE FROM cart_products WHERE cart_id = $1")
            .bind(cart)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        stamp(&mut tx, cart).await?;

        tx.commit().await?;
        Ok(removed)
    }

    async fn move_lines(&mut self, from: CartId, to: CartId) -> Result<u64, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        sqlx::query("DELETE FROM cart_products WHERE cart_id = $1")
            .bind(to)
            .execute(&mut *tx)
            .await?;
        let moved = sqlx::query("UPDATE cart_products SET cart_id = $2 WHERE cart_id = $1")
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        stamp(&mut tx, from).await?;
        stamp(&mut tx, to).await?;

        tx.commit().await?;
        Ok(moved)
    }
}

async fn stamp(conn: &mut sqlx::PgConnection, cart: CartId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE carts SET last_modified_at = now() WHERE id = $1")
        .bind(cart)
        .execute(conn)
        .await?;
    Ok(())
}
