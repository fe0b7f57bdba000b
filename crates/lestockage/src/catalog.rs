// Product catalog persistence

use crate::error::Result;
use crate::interactions::placeholders;
use crate::records::{round_to, InteractionType, Product};
use crate::schema::Storage;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Interaction totals for one product
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEngagement {
    /// Number of `view` interactions
    pub view_count: u64,
    /// Number of `purchase` interactions
    pub purchase_count: u64,
}

/// Read access to the product catalog, plus the upsert used by catalog sync.
pub trait CatalogStore {
    /// Fetch one product by id, active or not
    fn product(&self, id: i64) -> Result<Option<Product>>;

    /// Fetch the products that exist among `ids`, in id order
    fn products(&self, ids: &[i64]) -> Result<Vec<Product>>;

    /// Every active product, in id order
    fn active_products(&self) -> Result<Vec<Product>>;

    /// Active products in one category, in id order
    fn active_in_category(&self, category: &str) -> Result<Vec<Product>>;

    /// Active products with stock left, in id order
    fn in_stock_products(&self) -> Result<Vec<Product>>;

    /// Insert or replace a product
    fn upsert_product(&self, product: &Product) -> Result<()>;

    /// View and purchase totals for a product
    fn engagement(&self, product_id: i64) -> Result<ProductEngagement>;
}

const PRODUCT_COLUMNS: &str = "id, name, description, price, category, tags, image_url, stock, \
     is_active, avg_rating, total_reviews";

struct ProductRow {
    product: Product,
    tags: String,
}

impl ProductRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            product: Product {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                price: row.get(3)?,
                category: row.get(4)?,
                tags: Vec::new(),
                image_url: row.get(6)?,
                stock: row.get(7)?,
                is_active: row.get(8)?,
                avg_rating: row.get(9)?,
                total_reviews: row.get(10)?,
            },
            tags: row.get(5)?,
        })
    }

    fn into_product(self) -> Result<Product> {
        let mut product = self.product;
        product.tags = serde_json::from_str(&self.tags)?;
        Ok(product)
    }
}

impl Storage {
    fn query_products(&self, filter: &str, values: Vec<Value>) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products{} ORDER BY id ASC",
            PRODUCT_COLUMNS, filter
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), ProductRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(ProductRow::into_product).collect()
    }
}

impl CatalogStore for Storage {
    fn product(&self, id: i64) -> Result<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let row = self
            .conn()
            .query_row(&sql, params![id], ProductRow::read)
            .optional()?;

        row.map(ProductRow::into_product).transpose()
    }

    fn products(&self, ids: &[i64]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = format!(" WHERE id IN ({})", placeholders(ids.len()));
        self.query_products(&filter, ids.iter().map(|id| Value::Integer(*id)).collect())
    }

    fn active_products(&self) -> Result<Vec<Product>> {
        self.query_products(" WHERE is_active = 1", Vec::new())
    }

    fn active_in_category(&self, category: &str) -> Result<Vec<Product>> {
        self.query_products(
            " WHERE is_active = 1 AND category = ?",
            vec![Value::Text(category.to_string())],
        )
    }

    fn in_stock_products(&self) -> Result<Vec<Product>> {
        self.query_products(" WHERE is_active = 1 AND stock > 0", Vec::new())
    }

    fn upsert_product(&self, product: &Product) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn().execute(
            "INSERT INTO products (id, name, description, price, category, tags, image_url,
                 stock, is_active, avg_rating, total_reviews, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 price = excluded.price,
                 category = excluded.category,
                 tags = excluded.tags,
                 image_url = excluded.image_url,
                 stock = excluded.stock,
                 is_active = excluded.is_active,
                 avg_rating = excluded.avg_rating,
                 total_reviews = excluded.total_reviews,
                 updated_at = excluded.updated_at",
            params![
                product.id,
                product.name,
                product.description,
                round_to(product.price, 2),
                product.category,
                serde_json::to_string(&product.tags)?,
                product.image_url,
                product.stock,
                product.is_active,
                round_to(product.avg_rating, 2),
                product.total_reviews,
                now,
            ],
        )?;
        Ok(())
    }

    fn engagement(&self, product_id: i64) -> Result<ProductEngagement> {
        let (views, purchases): (i64, i64) = self.conn().query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN interaction_type = ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN interaction_type = ?3 THEN 1 ELSE 0 END), 0)
             FROM user_interactions WHERE product_id = ?1",
            params![
                product_id,
                InteractionType::View.as_str(),
                InteractionType::Purchase.as_str(),
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(ProductEngagement {
            view_count: views as u64,
            purchase_count: purchases as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactions::InteractionStore;
    use crate::records::{Actor, NewInteraction};
    use tempfile::NamedTempFile;

    fn seeded() -> (NamedTempFile, Storage) {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        let products = [
            Product::new(1, "Bottle", "outdoor", 12.5).with_tags(["eco", "steel"]).with_stock(3),
            Product::new(2, "Tent", "outdoor", 199.0).with_rating(4.456, 12),
            Product::new(3, "Stove", "outdoor", 45.0).inactive(),
            Product::new(4, "Kettle", "kitchen", 30.0).with_stock(1),
        ];
        for product in &products {
            storage.upsert_product(product).unwrap();
        }
        (temp_file, storage)
    }

    #[test]
    fn test_product_round_trip() {
        let (_file, storage) = seeded();
        let bottle = storage.product(1).unwrap().unwrap();
        assert_eq!(bottle.tags, vec!["eco".to_string(), "steel".to_string()]);
        assert!(bottle.is_active);

        let tent = storage.product(2).unwrap().unwrap();
        assert_eq!(tent.avg_rating, 4.46);

        assert!(storage.product(99).unwrap().is_none());
    }

    #[test]
    fn test_scoped_listings() {
        let (_file, storage) = seeded();
        let ids = |products: Vec<Product>| products.iter().map(|p| p.id).collect::<Vec<_>>();

        assert_eq!(ids(storage.active_products().unwrap()), vec![1, 2, 4]);
        assert_eq!(ids(storage.active_in_category("outdoor").unwrap()), vec![1, 2]);
        assert_eq!(ids(storage.in_stock_products().unwrap()), vec![1, 4]);
        assert_eq!(ids(storage.products(&[4, 3, 42]).unwrap()), vec![3, 4]);
    }

    #[test]
    fn test_upsert_replaces() {
        let (_file, storage) = seeded();
        storage
            .upsert_product(&Product::new(1, "Bottle v2", "outdoor", 14.0).inactive())
            .unwrap();
        let bottle = storage.product(1).unwrap().unwrap();
        assert_eq!(bottle.name, "Bottle v2");
        assert!(!bottle.is_active);
        assert!(bottle.tags.is_empty());
    }

    #[test]
    fn test_engagement_counts() {
        let (_file, storage) = seeded();
        let actor = Actor::session("s");
        for kind in [InteractionType::View, InteractionType::View, InteractionType::Purchase] {
            storage.record(&NewInteraction::new(actor.clone(), 1, kind)).unwrap();
        }

        let engagement = storage.engagement(1).unwrap();
        assert_eq!(engagement.view_count, 2);
        assert_eq!(engagement.purchase_count, 1);
        assert_eq!(storage.engagement(2).unwrap(), ProductEngagement::default());
    }
}
