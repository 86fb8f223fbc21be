use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::*;

#[derive(Clone)]
pub struct CatalogService {
    pool: SqlitePool,
}

impl CatalogService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ---------- 前台 ----------

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE status = 'enabled' ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn list_banners(&self) -> AppResult<Vec<Banner>> {
        let banners = sqlx::query_as::<_, Banner>(
            "SELECT * FROM banners WHERE status = 'enabled' ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(banners)
    }

    /// 前台商品列表：只展示在售商品
    pub async fn list_products(
        &self,
        query: &ProductQuery,
    ) -> AppResult<PaginatedResponse<Product>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let keyword_pattern = query
            .keyword
            .as_ref()
            .filter(|k| !k.trim().is_empty())
            .map(|k| format!("%{}%", k.trim()));

        let mut where_sql = String::from("WHERE status = 'on_shelf'");
        if query.category_id.is_some() {
            where_sql.push_str(" AND category_id = ?");
        }
        if keyword_pattern.is_some() {
            where_sql.push_str(" AND (title LIKE ? OR subtitle LIKE ?)");
        }

        let count_sql = format!("SELECT COUNT(*) FROM products {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(category_id) = query.category_id {
            count_query = count_query.bind(category_id);
        }
        if let Some(pattern) = &keyword_pattern {
            count_query = count_query.bind(pattern.clone()).bind(pattern.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM products {where_sql} ORDER BY sales_count DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query_as::<_, Product>(&list_sql);
        if let Some(category_id) = query.category_id {
            list_query = list_query.bind(category_id);
        }
        if let Some(pattern) = &keyword_pattern {
            list_query = list_query.bind(pattern.clone()).bind(pattern.clone());
        }
        let products = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(products, &params, total))
    }

    pub async fn get_product(&self, product_id: i64) -> AppResult<Product> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = ? AND status = 'on_shelf'",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        product.ok_or_else(|| AppError::NotFound("商品不存在或已下架".to_string()))
    }

    // ---------- 后台 ----------

    pub async fn admin_list_products(
        &self,
        query: &ProductQuery,
    ) -> AppResult<PaginatedResponse<Product>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(params.get_limit() as i64)
        .bind(params.get_offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(PaginatedResponse::new(products, &params, total))
    }

    pub async fn create_product(&self, request: CreateProductRequest) -> AppResult<Product> {
        if request.title.trim().is_empty() {
            return Err(AppError::ValidationError("商品标题不能为空".to_string()));
        }
        if request.price < 0 {
            return Err(AppError::ValidationError("商品价格不能为负".to_string()));
        }

        let product_id = sqlx::query(
            r#"
            INSERT INTO products (category_id, title, subtitle, description, cover_url, kind, price, original_price)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.category_id)
        .bind(request.title.trim())
        .bind(request.subtitle.unwrap_or_default())
        .bind(request.description.unwrap_or_default())
        .bind(&request.cover_url)
        .bind(&request.kind)
        .bind(request.price)
        .bind(request.original_price)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_product_any_status(product_id).await
    }

    pub async fn update_product(
        &self,
        product_id: i64,
        request: UpdateProductRequest,
    ) -> AppResult<Product> {
        let product = self.get_product_any_status(product_id).await?;

        let price = request.price.unwrap_or(product.price);
        if price < 0 {
            return Err(AppError::ValidationError("商品价格不能为负".to_string()));
        }

        sqlx::query(
            r#"
            UPDATE products SET
                category_id = ?, title = ?, subtitle = ?, description = ?,
                cover_url = ?, kind = ?, price = ?, original_price = ?, status = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(request.category_id.or(product.category_id))
        .bind(request.title.unwrap_or(product.title))
        .bind(request.subtitle.unwrap_or(product.subtitle))
        .bind(request.description.unwrap_or(product.description))
        .bind(request.cover_url.or(product.cover_url))
        .bind(request.kind.unwrap_or(product.kind))
        .bind(price)
        .bind(request.original_price.or(product.original_price))
        .bind(request.status.unwrap_or(product.status))
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        self.get_product_any_status(product_id).await
    }

    /// 删除商品。购物车里的引用一并清掉，历史订单持有价格/标题快照，不受影响
    pub async fn delete_product(&self, product_id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_items WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("商品不存在".to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn admin_list_categories(&self) -> AppResult<Vec<Category>> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY sort_order, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    pub async fn create_category(&self, request: CreateCategoryRequest) -> AppResult<Category> {
        if request.name.trim().is_empty() {
            return Err(AppError::ValidationError("分类名称不能为空".to_string()));
        }

        let category_id = sqlx::query("INSERT INTO categories (name, sort_order) VALUES (?, ?)")
            .bind(request.name.trim())
            .bind(request.sort_order.unwrap_or(0))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(category)
    }

    pub async fn update_category(
        &self,
        category_id: i64,
        request: UpdateCategoryRequest,
    ) -> AppResult<Category> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("分类不存在".to_string()))?;

        sqlx::query("UPDATE categories SET name = ?, sort_order = ?, status = ? WHERE id = ?")
            .bind(request.name.unwrap_or(category.name))
            .bind(request.sort_order.unwrap_or(category.sort_order))
            .bind(request.status.unwrap_or(category.status))
            .bind(category_id)
            .execute(&self.pool)
            .await?;

        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(category)
    }

    /// 删除分类。挂在该分类下的商品改为未分类，上架状态不变
    pub async fn delete_category(&self, category_id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE products SET category_id = NULL WHERE category_id = ?")
            .bind(category_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(category_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("分类不存在".to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn admin_list_banners(&self) -> AppResult<Vec<Banner>> {
        let banners = sqlx::query_as::<_, Banner>("SELECT * FROM banners ORDER BY sort_order, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(banners)
    }

    pub async fn create_banner(&self, request: CreateBannerRequest) -> AppResult<Banner> {
        let banner_id = sqlx::query(
            "INSERT INTO banners (title, image_url, link_url, sort_order) VALUES (?, ?, ?, ?)",
        )
        .bind(&request.title)
        .bind(&request.image_url)
        .bind(&request.link_url)
        .bind(request.sort_order.unwrap_or(0))
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let banner = sqlx::query_as::<_, Banner>("SELECT * FROM banners WHERE id = ?")
            .bind(banner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(banner)
    }

    pub async fn update_banner(
        &self,
        banner_id: i64,
        request: UpdateBannerRequest,
    ) -> AppResult<Banner> {
        let banner = sqlx::query_as::<_, Banner>("SELECT * FROM banners WHERE id = ?")
            .bind(banner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("轮播图不存在".to_string()))?;

        sqlx::query(
            "UPDATE banners SET title = ?, image_url = ?, link_url = ?, sort_order = ?, status = ? WHERE id = ?",
        )
        .bind(request.title.unwrap_or(banner.title))
        .bind(request.image_url.unwrap_or(banner.image_url))
        .bind(request.link_url.or(banner.link_url))
        .bind(request.sort_order.unwrap_or(banner.sort_order))
        .bind(request.status.unwrap_or(banner.status))
        .bind(banner_id)
        .execute(&self.pool)
        .await?;

        let banner = sqlx::query_as::<_, Banner>("SELECT * FROM banners WHERE id = ?")
            .bind(banner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(banner)
    }

    pub async fn delete_banner(&self, banner_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM banners WHERE id = ?")
            .bind(banner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("轮播图不存在".to_string()));
        }
        Ok(())
    }

    async fn get_product_any_status(&self, product_id: i64) -> AppResult<Product> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        product.ok_or_else(|| AppError::NotFound("商品不存在".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn seed_user(pool: &SqlitePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'x')")
            .bind(username)
            .bind(format!("{username}@test.local"))
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    async fn seed_product(pool: &SqlitePool, category_id: Option<i64>) -> i64 {
        sqlx::query(
            "INSERT INTO products (category_id, title, price, status) VALUES (?, '课程', 9900, 'on_shelf')",
        )
        .bind(category_id)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn seed_category(pool: &SqlitePool, name: &str) -> i64 {
        sqlx::query("INSERT INTO categories (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_delete_product_clears_cart_references() {
        let pool = setup_pool().await;
        let svc = CatalogService::new(pool.clone());
        let user_id = seed_user(&pool, "alice").await;
        let product_id = seed_product(&pool, None).await;
        sqlx::query("INSERT INTO cart_items (user_id, product_id, quantity) VALUES (?, ?, 2)")
            .bind(user_id)
            .bind(product_id)
            .execute(&pool)
            .await
            .unwrap();

        // 外键约束下商品在购物车里也必须能删
        svc.delete_product(product_id).await.unwrap();

        let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&pool)
            .await
            .unwrap();
        let cart_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(products, 0);
        assert_eq!(cart_rows, 0);

        // 再删报不存在
        assert!(svc.delete_product(product_id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_category_detaches_products() {
        let pool = setup_pool().await;
        let svc = CatalogService::new(pool.clone());
        let category_id = seed_category(&pool, "编程").await;
        let product_id = seed_product(&pool, Some(category_id)).await;

        svc.delete_category(category_id).await.unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        // 商品保留，只是脱离分类
        let detached: Option<i64> =
            sqlx::query_scalar("SELECT category_id FROM products WHERE id = ?")
                .bind(product_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(detached, None);

        assert!(svc.delete_category(category_id).await.is_err());
    }
}
