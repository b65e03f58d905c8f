//! # Customer Repository
//!
//! Customers carry the running "utang" balance. It is raised by due sales
//! (see `SaleStore::apply_sale_balance`) and lowered by account payments
//! here, never below zero.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use tindahan_core::{Customer, Payment};

use super::{micros, sql_limit, ts};
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::store::{AccountPaymentOutcome, ChangeWindow, CustomerStore};

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    store_id: String,
    name: String,
    phone: Option<String>,
    balance_due_centavos: i64,
    is_active: bool,
    created_at: i64,
    updated_at: i64,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            store_id: row.store_id,
            name: row.name,
            phone: row.phone,
            balance_due_centavos: row.balance_due_centavos,
            is_active: row.is_active,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        }
    }
}

const CUSTOMER_SELECT: &str = r#"
    SELECT id, store_id, name, phone, balance_due_centavos, is_active, created_at, updated_at
    FROM customers
"#;

#[async_trait]
impl CustomerStore for Database {
    async fn get_customer(&self, store_id: &str, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("{} WHERE store_id = ?1 AND id = ?2", CUSTOMER_SELECT);
        let row = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(store_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Customer::from))
    }

    async fn upsert_customer(&self, customer: &Customer) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (
                id, store_id, name, phone, balance_due_centavos, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                balance_due_centavos = excluded.balance_due_centavos,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.store_id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.balance_due_centavos)
        .bind(customer.is_active)
        .bind(micros(customer.created_at))
        .bind(micros(customer.updated_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn customers_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Vec<Customer>> {
        let sql = format!(
            r#"{}
            WHERE store_id = ?1 AND updated_at > ?2 AND (?3 IS NULL OR updated_at <= ?3)
            ORDER BY updated_at, id
            LIMIT ?4
            "#,
            CUSTOMER_SELECT
        );
        let rows = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(store_id)
            .bind(window.after)
            .bind(window.until)
            .bind(sql_limit(window.limit))
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }

    async fn apply_account_payment(
        &self,
        customer_id: &str,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> DbResult<AccountPaymentOutcome> {
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (
                id, store_id, sale_id, customer_id, method, amount_centavos, reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.store_id)
        .bind(&payment.sale_id)
        .bind(customer_id)
        .bind(payment.method)
        .bind(payment.amount_centavos)
        .bind(&payment.reference)
        .bind(micros(payment.created_at))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            debug!(customer_id, payment_id = %payment.id, "Applying account payment");
            sqlx::query(
                r#"
                UPDATE customers
                SET balance_due_centavos = MAX(0, balance_due_centavos - ?3), updated_at = ?4
                WHERE store_id = ?1 AND id = ?2
                "#,
            )
            .bind(&payment.store_id)
            .bind(customer_id)
            .bind(payment.amount_centavos)
            .bind(micros(now))
            .execute(&mut *tx)
            .await?;
        }

        let balance: Option<i64> = sqlx::query_scalar(
            "SELECT balance_due_centavos FROM customers WHERE store_id = ?1 AND id = ?2",
        )
        .bind(&payment.store_id)
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance_due_centavos) = balance else {
            tx.rollback().await?;
            return Err(DbError::not_found("Customer", customer_id));
        };

        tx.commit().await?;
        Ok(AccountPaymentOutcome {
            inserted,
            balance_due_centavos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use tindahan_core::{clock, PaymentMethod};

    fn customer(balance: i64) -> Customer {
        let now = clock::now();
        Customer {
            id: "c-1".to_string(),
            store_id: "store-1".to_string(),
            name: "Aling Nena".to_string(),
            phone: None,
            balance_due_centavos: balance,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn payment(id: &str, amount: i64) -> Payment {
        Payment {
            id: id.to_string(),
            store_id: "store-1".to_string(),
            sale_id: None,
            customer_id: Some("c-1".to_string()),
            method: PaymentMethod::Cash,
            amount_centavos: amount,
            reference: None,
            created_at: clock::now(),
        }
    }

    #[tokio::test]
    async fn test_account_payment_applies_once_and_floors() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.upsert_customer(&customer(600)).await.unwrap();

        let first = db
            .apply_account_payment("c-1", &payment("pay-1", 600), clock::now())
            .await
            .unwrap();
        assert!(first.inserted);
        assert_eq!(first.balance_due_centavos, 0);

        let replay = db
            .apply_account_payment("c-1", &payment("pay-1", 600), clock::now())
            .await
            .unwrap();
        assert!(!replay.inserted);
        assert_eq!(replay.balance_due_centavos, 0);

        let over = db
            .apply_account_payment("c-1", &payment("pay-2", 50), clock::now())
            .await
            .unwrap();
        assert_eq!(over.balance_due_centavos, 0);
    }
}
