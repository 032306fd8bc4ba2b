//! Customer accounts, saved billing data and addresses, and password reset
//! tokens.

use chrono::{DateTime, Utc};
use sqlx::Connection;
use uuid::Uuid;

use emporium_core::{Email, UserId};

use super::{PgStore, RepositoryError};
use crate::models::{
    BillingData, NewShippingAddress, NewUser, ResetToken, SavedShippingAddress, UserAccount,
};
use crate::store::AccountStore;

const USER_COLUMNS: &str = "id, email, first_name, last_name, phone, password_hash, created_at";

const ADDRESS_COLUMNS: &str = "id, uuid, user_id, first_name, last_name, company_name, street, \
     postcode, city, country_code, country, phone";

impl AccountStore for PgStore {
    async fn user_by_email(&mut self, email: &Email) -> Result<Option<UserAccount>, RepositoryError> {
        let user = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.as_str())
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(user)
    }

    async fn user_by_id(&mut self, id: UserId) -> Result<Option<UserAccount>, RepositoryError> {
        let user = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(user)
    }

    async fn create_user(&mut self, user: &NewUser) -> Result<UserId, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let id = sqlx::query_scalar::<_, UserId>(
            r"
            INSERT INTO users (email, first_name, last_name, phone, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(user.email.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from_unique)?;

        sqlx::query("INSERT INTO billing_data (user_id) VALUES ($1)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO carts (user_id, last_modified_at) VALUES ($1, now())")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn update_password(&mut self, user: UserId, hash: &str) -> Result<(), RepositoryError> {
        let updated = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user)
            .bind(hash)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_account(
        &mut self,
        user: UserId,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            "UPDATE users SET first_name = $2, last_name = $3, phone = $4 WHERE id = $1",
        )
        .bind(user)
        .bind(first_name)
        .bind(last_name)
        .bind(phone)
        .execute(&mut *self.conn)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn billing_data(&mut self, user: UserId) -> Result<Option<BillingData>, RepositoryError> {
        let data = sqlx::query_as::<_, BillingData>(
            r"
            SELECT name, street, postcode, city, country_code, country, tax_id, email
            FROM billing_data
            WHERE user_id = $1
            ",
        )
        .bind(user)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(data)
    }

    async fn update_billing_data(
        &mut self,
        user: UserId,
        data: &BillingData,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO billing_data
                (user_id, name, street, postcode, city, country_code, country, tax_id, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO UPDATE SET
                name = EXCLUDED.name,
                street = EXCLUDED.street,
                postcode = EXCLUDED.postcode,
                city = EXCLUDED.city,
                country_code = EXCLUDED.country_code,
                country = EXCLUDED.country,
                tax_id = EXCLUDED.tax_id,
                email = EXCLUDED.email
            ",
        )
        .bind(user)
        .bind(&data.name)
        .bind(&data.street)
        .bind(&data.postcode)
        .bind(&data.city)
        .bind(&data.country_code)
        .bind(&data.country)
        .bind(&data.tax_id)
        .bind(&data.email)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    async fn shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
    ) -> Result<Option<SavedShippingAddress>, RepositoryError> {
        let address = sqlx::query_as::<_, SavedShippingAddress>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM shipping_addresses WHERE user_id = $1 AND uuid = $2"
        ))
        .bind(user)
        .bind(uuid)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(address)
    }

    async fn shipping_addresses(
        &mut self,
        user: UserId,
    ) -> Result<Vec<SavedShippingAddress>, RepositoryError> {
        let addresses = sqlx::query_as::<_, SavedShippingAddress>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM shipping_addresses WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(addresses)
    }

    async fn insert_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
        address: &NewShippingAddress,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO shipping_addresses
                (uuid, user_id, first_name, last_name, company_name, street, postcode,
                 city, country_code, country, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(uuid)
        .bind(user)
        .bind(&address.first_name)
        .bind(&address.last_name)
        .bind(&address.company_name)
        .bind(&address.street)
        .bind(&address.postcode)
        .bind(&address.city)
        .bind(&address.country_code)
        .bind(&address.country)
        .bind(&address.phone)
        .execute(&mut *self.conn)
        .await
        .map_err(RepositoryError::from_unique)?;
        Ok(())
    }

    async fn update_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
        address: &NewShippingAddress,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            r"
            UPDATE shipping_addresses
            SET first_name = $3, last_name = $4, company_name = $5, street = $6,
                postcode = $7, city = $8, country_code = $9, country = $10, phone = $11
            WHERE user_id = $1 AND uuid = $2
            ",
        )
        .bind(user)
        .bind(uuid)
        .bind(&address.first_name)
        .bind(&address.last_name)
        .bind(&address.company_name)
        .bind(&address.street)
        .bind(&address.postcode)
        .bind(&address.city)
        .bind(&address.country_code)
        .bind(&address.country)
        .bind(&address.phone)
        .execute(&mut *self.conn)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn delete_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
    ) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM shipping_addresses WHERE user_id = $1 AND uuid = $2")
            .bind(user)
            .bind(uuid)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        Ok(deleted == 1)
    }

    async fn insert_reset_token(
        &mut self,
        user: UserId,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (token, user_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(token)
        .bind(user)
        .bind(at)
        .execute(&mut *self.conn)
        .await
        .map_err(RepositoryError::from_unique)?;
        Ok(())
    }

    async fn reset_token(&mut self, token: Uuid) -> Result<Option<ResetToken>, RepositoryError> {
        let row = sqlx::query_as::<_, ResetToken>(
            "SELECT token, user_id, created_at FROM password_reset_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row)
    }

    async fn delete_reset_tokens(&mut self, user: UserId) -> Result<u64, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}
