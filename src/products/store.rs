//! Product Storage
//! Mission: Persist the catalog with soft-delete semantics

use crate::products::models::{Product, ProductQuery, UpdateProductRequest};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, types::Value, Connection, OpenFlags};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price REAL NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    image_url TEXT,
    stock INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_by TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_products_category ON products(category, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_products_active ON products(is_active, created_at DESC);
"#;

const PRODUCT_COLUMNS: &str = "id, name, description, price, category, image_url, stock, \
     is_active, created_by, created_at, updated_at";

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

/// Fields for a new product row
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub image_url: Option<String>,
    pub stock: i64,
    pub created_by: Option<Uuid>,
}

/// Product storage with SQLite backend
pub struct ProductStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProductStore {
    /// Open (or create) the database and initialize the schema
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize products schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn insert(&self, new_product: NewProduct) -> Result<Product> {
        let id = Uuid::new_v4();
        let now = Utc::now().timestamp();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO products (id, name, description, price, category, image_url, stock,
                                   is_active, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?9)",
            params![
                id.to_string(),
                new_product.name,
                new_product.description,
                new_product.price,
                new_product.category,
                new_product.image_url,
                new_product.stock,
                new_product.created_by.map(|u| u.to_string()),
                now,
            ],
        )
        .context("Failed to insert product")?;
        drop(conn);

        info!("🛒 Created product: {}", new_product.name);

        self.find_by_id(&id)?
            .context("Inserted product missing on re-read")
    }

    pub fn find_by_id(&self, id: &Uuid) -> Result<Option<Product>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let mut stmt = conn.prepare_cached(&sql)?;

        match stmt.query_row(params![id.to_string()], row_to_product) {
            Ok(product) => Ok(Some(product)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List active products matching the filters, newest first
    pub fn list(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut sql =
            format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
            sql.push_str(" AND category = ?");
            args.push(Value::from(category.to_string()));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            sql.push_str(" AND (name LIKE ? OR description LIKE ?)");
            let pattern = format!("%{}%", search);
            args.push(Value::from(pattern.clone()));
            args.push(Value::from(pattern));
        }
        if let Some(min_price) = query.min_price {
            sql.push_str(" AND price >= ?");
            args.push(Value::from(min_price));
        }
        if let Some(max_price) = query.max_price {
            sql.push_str(" AND price <= ?");
            args.push(Value::from(max_price));
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
        args.push(Value::from(limit as i64));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let products = stmt
            .query_map(params_from_iter(args), row_to_product)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(products)
    }

    /// Apply a partial update. Returns None when the product does not exist
    /// or has been soft-deleted.
    pub fn update(&self, id: &Uuid, changes: &UpdateProductRequest) -> Result<Option<Product>> {
        let mut sets = vec!["updated_at = ?".to_string()];
        let mut args: Vec<Value> = vec![Value::from(Utc::now().timestamp())];

        if let Some(name) = &changes.name {
            sets.push("name = ?".to_string());
            args.push(Value::from(name.clone()));
        }
        if let Some(description) = &changes.description {
            sets.push("description = ?".to_string());
            args.push(Value::from(description.clone()));
        }
        if let Some(price) = changes.price {
            sets.push("price = ?".to_string());
            args.push(Value::from(price));
        }
        if let Some(category) = &changes.category {
            sets.push("category = ?".to_string());
            args.push(Value::from(category.clone()));
        }
        if let Some(image_url) = &changes.image_url {
            sets.push("image_url = ?".to_string());
            args.push(Value::from(image_url.clone()));
        }
        if let Some(stock) = changes.stock {
            sets.push("stock = ?".to_string());
            args.push(Value::from(stock));
        }

        let sql = format!(
            "UPDATE products SET {} WHERE id = ? AND is_active = 1",
            sets.join(", ")
        );
        args.push(Value::from(id.to_string()));

        let changed = {
            let conn = self.conn.lock();
            conn.execute(&sql, params_from_iter(args))?
        };

        if changed == 0 {
            return Ok(None);
        }
        self.find_by_id(id)
    }

    /// Soft delete: clear the active flag, keep the row. Returns false when
    /// the product is unknown or already deleted.
    pub fn soft_delete(&self, id: &Uuid) -> Result<bool> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1 AND is_active = 1",
            params![id.to_string(), now],
        )?;

        if changed > 0 {
            info!("🗑️  Soft-deleted product: {}", id);
        }
        Ok(changed > 0)
    }
}

fn row_to_product(row: &rusqlite::Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        category: row.get(4)?,
        image_url: row.get(5)?,
        stock: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
        created_by: row
            .get::<_, Option<String>>(8)?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        created_at: DateTime::from_timestamp(row.get::<_, i64>(9)?, 0).unwrap_or_default(),
        updated_at: DateTime::from_timestamp(row.get::<_, i64>(10)?, 0).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (ProductStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = ProductStore::new(temp_file.path().to_str().unwrap()).unwrap();
        (store, temp_file)
    }

    fn new_product(name: &str, price: f64, category: &str) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: format!("{name} description"),
            price,
            category: category.to_string(),
            image_url: None,
            stock: 10,
            created_by: None,
        }
    }

    #[test]
    fn test_insert_and_fetch() {
        let (store, _temp) = create_test_store();

        let product = store.insert(new_product("Keyboard", 49.99, "peripherals")).unwrap();
        assert!(product.is_active);
        assert_eq!(product.stock, 10);

        let fetched = store.find_by_id(&product.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Keyboard");
        assert_eq!(fetched.price, 49.99);
    }

    #[test]
    fn test_list_filters() {
        let (store, _temp) = create_test_store();
        store.insert(new_product("Keyboard", 49.99, "peripherals")).unwrap();
        store.insert(new_product("Mouse", 19.99, "peripherals")).unwrap();
        store.insert(new_product("Monitor", 199.99, "displays")).unwrap();

        let all = store.list(&ProductQuery::default()).unwrap();
        assert_eq!(all.len(), 3);

        let peripherals = store
            .list(&ProductQuery {
                category: Some("peripherals".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(peripherals.len(), 2);

        let cheap = store
            .list(&ProductQuery {
                max_price: Some(50.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cheap.len(), 2);

        let searched = store
            .list(&ProductQuery {
                search: Some("Mon".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].name, "Monitor");

        let limited = store
            .list(&ProductQuery {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_partial_update() {
        let (store, _temp) = create_test_store();
        let product = store.insert(new_product("Keyboard", 49.99, "peripherals")).unwrap();

        let updated = store
            .update(
                &product.id,
                &UpdateProductRequest {
                    price: Some(39.99),
                    stock: Some(5),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.price, 39.99);
        assert_eq!(updated.stock, 5);
        assert_eq!(updated.name, "Keyboard"); // untouched field survives
    }

    #[test]
    fn test_soft_delete_hides_from_listing() {
        let (store, _temp) = create_test_store();
        let product = store.insert(new_product("Keyboard", 49.99, "peripherals")).unwrap();

        assert!(store.soft_delete(&product.id).unwrap());

        // Row still present, flagged inactive
        let row = store.find_by_id(&product.id).unwrap().unwrap();
        assert!(!row.is_active);

        // Gone from listings
        assert!(store.list(&ProductQuery::default()).unwrap().is_empty());

        // Second delete is a no-op
        assert!(!store.soft_delete(&product.id).unwrap());

        // Updates no longer apply
        let updated = store
            .update(
                &product.id,
                &UpdateProductRequest {
                    price: Some(1.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.is_none());
    }

    #[test]
    fn test_update_missing_product() {
        let (store, _temp) = create_test_store();
        let updated = store
            .update(&Uuid::new_v4(), &UpdateProductRequest::default())
            .unwrap();
        assert!(updated.is_none());
    }
}
