//! # Catalog Repository
//!
//! Products, categories and store settings. Writes here are plain upserts;
//! stock quantity is only ever moved by the ledger.

use async_trait::async_trait;
use tracing::debug;

use tindahan_core::{Capability, Category, Product, StoreSettings};

use super::{from_json, micros, sql_limit, to_u32, ts};
use crate::error::DbResult;
use crate::pool::Database;
use crate::store::{CatalogStore, ChangeWindow};

const PRODUCT_COLUMNS: &str = r#"
    id, store_id, sku, name, price_centavos, stock_quantity, category_id,
    parent_id, is_sellable, is_active, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    store_id: String,
    sku: String,
    name: String,
    price_centavos: i64,
    stock_quantity: i64,
    category_id: Option<String>,
    parent_id: Option<String>,
    is_sellable: bool,
    is_active: bool,
    created_at: i64,
    updated_at: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            store_id: row.store_id,
            sku: row.sku,
            name: row.name,
            price_centavos: row.price_centavos,
            stock_quantity: row.stock_quantity,
            category_id: row.category_id,
            parent_id: row.parent_id,
            is_sellable: row.is_sellable,
            is_active: row.is_active,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: String,
    store_id: String,
    name: String,
    is_active: bool,
    updated_at: i64,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            store_id: row.store_id,
            name: row.name,
            is_active: row.is_active,
            updated_at: ts(row.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    store_id: String,
    allow_negative_stock: bool,
    auto_discount_bps: i64,
    step_up_capabilities: String,
    manager_pin_hash: Option<String>,
    receipt_prefix: String,
    updated_at: i64,
}

impl TryFrom<SettingsRow> for StoreSettings {
    type Error = crate::DbError;

    fn try_from(row: SettingsRow) -> DbResult<Self> {
        let step_up_capabilities: Vec<Capability> =
            from_json("store_settings", &row.step_up_capabilities)?;
        Ok(StoreSettings {
            store_id: row.store_id,
            allow_negative_stock: row.allow_negative_stock,
            auto_discount_bps: to_u32("store_settings", row.auto_discount_bps)?,
            step_up_capabilities,
            manager_pin_hash: row.manager_pin_hash,
            receipt_prefix: row.receipt_prefix,
            updated_at: ts(row.updated_at),
        })
    }
}

const SETTINGS_SELECT: &str = r#"
    SELECT store_id, allow_negative_stock, auto_discount_bps, step_up_capabilities,
           manager_pin_hash, receipt_prefix, updated_at
    FROM store_settings
"#;

#[async_trait]
impl CatalogStore for Database {
    async fn get_product(&self, store_id: &str, id: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE store_id = ?1 AND id = ?2",
            PRODUCT_COLUMNS
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Product::from))
    }

    async fn upsert_product(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Upserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, store_id, sku, name, price_centavos, stock_quantity, category_id,
                parent_id, is_sellable, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (id) DO UPDATE SET
                sku = excluded.sku,
                name = excluded.name,
                price_centavos = excluded.price_centavos,
                stock_quantity = excluded.stock_quantity,
                category_id = excluded.category_id,
                parent_id = excluded.parent_id,
                is_sellable = excluded.is_sellable,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id)
        .bind(&product.store_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_centavos)
        .bind(product.stock_quantity)
        .bind(&product.category_id)
        .bind(&product.parent_id)
        .bind(product.is_sellable)
        .bind(product.is_active)
        .bind(micros(product.created_at))
        .bind(micros(product.updated_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn upsert_category(&self, category: &Category) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, store_id, name, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&category.id)
        .bind(&category.store_id)
        .bind(&category.name)
        .bind(category.is_active)
        .bind(micros(category.updated_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn get_settings(&self, store_id: &str) -> DbResult<Option<StoreSettings>> {
        let sql = format!("{} WHERE store_id = ?1", SETTINGS_SELECT);
        let row = sqlx::query_as::<_, SettingsRow>(&sql)
            .bind(store_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(StoreSettings::try_from).transpose()
    }

    async fn upsert_settings(&self, settings: &StoreSettings) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO store_settings (
                store_id, allow_negative_stock, auto_discount_bps, step_up_capabilities,
                manager_pin_hash, receipt_prefix, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (store_id) DO UPDATE SET
                allow_negative_stock = excluded.allow_negative_stock,
                auto_discount_bps = excluded.auto_discount_bps,
                step_up_capabilities = excluded.step_up_capabilities,
                manager_pin_hash = excluded.manager_pin_hash,
                receipt_prefix = excluded.receipt_prefix,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&settings.store_id)
        .bind(settings.allow_negative_stock)
        .bind(i64::from(settings.auto_discount_bps))
        .bind(serde_json::to_string(&settings.step_up_capabilities)?)
        .bind(&settings.manager_pin_hash)
        .bind(&settings.receipt_prefix)
        .bind(micros(settings.updated_at))
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn products_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {} FROM products
            WHERE store_id = ?1 AND updated_at > ?2 AND (?3 IS NULL OR updated_at <= ?3)
            ORDER BY updated_at, id
            LIMIT ?4
            "#,
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_id)
            .bind(window.after)
            .bind(window.until)
            .bind(sql_limit(window.limit))
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn categories_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            r#"
            SELECT id, store_id, name, is_active, updated_at FROM categories
            WHERE store_id = ?1 AND updated_at > ?2 AND (?3 IS NULL OR updated_at <= ?3)
            ORDER BY updated_at, id
            LIMIT ?4
            "#,
        )
        .bind(store_id)
        .bind(window.after)
        .bind(window.until)
        .bind(sql_limit(window.limit))
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn settings_changed(
        &self,
        store_id: &str,
        window: ChangeWindow,
    ) -> DbResult<Option<StoreSettings>> {
        let sql = format!(
            "{} WHERE store_id = ?1 AND updated_at > ?2 AND (?3 IS NULL OR updated_at <= ?3)",
            SETTINGS_SELECT
        );
        let row = sqlx::query_as::<_, SettingsRow>(&sql)
            .bind(store_id)
            .bind(window.after)
            .bind(window.until)
            .fetch_optional(self.pool())
            .await?;
        row.map(StoreSettings::try_from).transpose()
    }
}
