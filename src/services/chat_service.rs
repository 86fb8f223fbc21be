use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::*;

const MAX_MESSAGE_LEN: usize = 2000;
const DEFAULT_POLL_LIMIT: u32 = 50;

/// 客服会话。REST 轮询模型：客户端带 after_id 增量拉取。
#[derive(Clone)]
pub struct ChatService {
    pool: SqlitePool,
}

impl ChatService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 获取用户当前会话，没有打开的会话则新建
    pub async fn open_session(&self, user_id: i64) -> AppResult<ChatSession> {
        if let Some(session) = self.find_open_session(user_id).await? {
            return Ok(session);
        }

        let session_id = sqlx::query("INSERT INTO chat_sessions (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        let session =
            sqlx::query_as::<_, ChatSession>("SELECT * FROM chat_sessions WHERE id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(session)
    }

    /// 用户发送消息，会话关闭后发送会重新打开新会话
    pub async fn user_send(
        &self,
        user_id: i64,
        request: SendMessageRequest,
    ) -> AppResult<ChatMessage> {
        let session = self.open_session(user_id).await?;
        self.insert_message(session.id, user_id, SenderRole::User, &request.content)
            .await
    }

    /// 用户增量拉取消息，并把客服消息标记已读
    pub async fn user_poll(
        &self,
        user_id: i64,
        query: &MessageQuery,
    ) -> AppResult<Vec<ChatMessage>> {
        let session = match self.find_open_session(user_id).await? {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };

        let messages = self.fetch_messages(session.id, query).await?;

        sqlx::query(
            "UPDATE chat_messages SET is_read = 1 WHERE session_id = ? AND sender_role = 'admin' AND is_read = 0",
        )
        .bind(session.id)
        .execute(&self.pool)
        .await?;

        Ok(messages)
    }

    pub async fn user_unread(&self, user_id: i64) -> AppResult<UnreadCountResponse> {
        let unread: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM chat_messages m
            JOIN chat_sessions s ON s.id = m.session_id
            WHERE s.user_id = ? AND m.sender_role = 'admin' AND m.is_read = 0
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UnreadCountResponse { unread })
    }

    // ---------- 后台 ----------

    pub async fn admin_list_sessions(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
        status: Option<SessionStatus>,
    ) -> AppResult<PaginatedResponse<ChatSession>> {
        let params = PaginationParams::new(page, per_page);

        let mut where_sql = String::from("WHERE 1=1");
        if status.is_some() {
            where_sql.push_str(" AND status = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM chat_sessions {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(s) = &status {
            count_query = count_query.bind(s.clone());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM chat_sessions {where_sql} ORDER BY last_message_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query_as::<_, ChatSession>(&list_sql);
        if let Some(s) = &status {
            list_query = list_query.bind(s.clone());
        }
        let sessions = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(sessions, &params, total))
    }

    /// 客服回复，首次回复时认领会话
    pub async fn admin_reply(
        &self,
        admin_id: i64,
        session_id: i64,
        request: SendMessageRequest,
    ) -> AppResult<ChatMessage> {
        let session = self.find_session(session_id).await?;
        if session.status != SessionStatus::Open {
            return Err(AppError::ValidationError("会话已关闭".to_string()));
        }

        if session.admin_id.is_none() {
            sqlx::query("UPDATE chat_sessions SET admin_id = ? WHERE id = ? AND admin_id IS NULL")
                .bind(admin_id)
                .bind(session_id)
                .execute(&self.pool)
                .await?;
        }

        self.insert_message(session_id, admin_id, SenderRole::Admin, &request.content)
            .await
    }

    /// 客服增量拉取消息，并把用户消息标记已读
    pub async fn admin_poll(
        &self,
        session_id: i64,
        query: &MessageQuery,
    ) -> AppResult<Vec<ChatMessage>> {
        self.find_session(session_id).await?;
        let messages = self.fetch_messages(session_id, query).await?;

        sqlx::query(
            "UPDATE chat_messages SET is_read = 1 WHERE session_id = ? AND sender_role = 'user' AND is_read = 0",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(messages)
    }

    pub async fn close_session(&self, session_id: i64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET status = 'closed' WHERE id = ? AND status = 'open'",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("会话不存在或已关闭".to_string()));
        }
        Ok(())
    }

    // ---------- 内部 ----------

    async fn find_open_session(&self, user_id: i64) -> AppResult<Option<ChatSession>> {
        let session = sqlx::query_as::<_, ChatSession>(
            "SELECT * FROM chat_sessions WHERE user_id = ? AND status = 'open' ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_session(&self, session_id: i64) -> AppResult<ChatSession> {
        sqlx::query_as::<_, ChatSession>("SELECT * FROM chat_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("会话不存在".to_string()))
    }

    async fn insert_message(
        &self,
        session_id: i64,
        sender_id: i64,
        sender_role: SenderRole,
        content: &str,
    ) -> AppResult<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::ValidationError("消息内容不能为空".to_string()));
        }
        if content.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::ValidationError(format!(
                "消息内容不能超过{MAX_MESSAGE_LEN}字"
            )));
        }

        let mut tx = self.pool.begin().await?;

        let message_id = sqlx::query(
            "INSERT INTO chat_messages (session_id, sender_id, sender_role, content) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(sender_id)
        .bind(&sender_role)
        .bind(content)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE chat_sessions SET last_message_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        let message =
            sqlx::query_as::<_, ChatMessage>("SELECT * FROM chat_messages WHERE id = ?")
                .bind(message_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn fetch_messages(
        &self,
        session_id: i64,
        query: &MessageQuery,
    ) -> AppResult<Vec<ChatMessage>> {
        let limit = query.limit.unwrap_or(DEFAULT_POLL_LIMIT).clamp(1, 200);
        let after_id = query.after_id.unwrap_or(0);

        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages WHERE session_id = ? AND id > ? ORDER BY id LIMIT ?",
        )
        .bind(session_id)
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
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

    fn message(content: &str) -> SendMessageRequest {
        SendMessageRequest {
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_session_reuses_existing() {
        let pool = setup_pool().await;
        let svc = ChatService::new(pool.clone());
        let user_id = seed_user(&pool, "alice").await;

        let first = svc.open_session(user_id).await.unwrap();
        let second = svc.open_session(user_id).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_poll_is_incremental_and_marks_read() {
        let pool = setup_pool().await;
        let svc = ChatService::new(pool.clone());
        let user_id = seed_user(&pool, "alice").await;
        let admin_id = seed_user(&pool, "admin").await;

        let session = svc.open_session(user_id).await.unwrap();
        svc.user_send(user_id, message("订单没到账")).await.unwrap();
        svc.admin_reply(admin_id, session.id, message("正在为您查询"))
            .await
            .unwrap();

        assert_eq!(svc.user_unread(user_id).await.unwrap().unread, 1);

        let all = svc
            .user_poll(
                user_id,
                &MessageQuery {
                    after_id: None,
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        // 拉取后客服消息已读
        assert_eq!(svc.user_unread(user_id).await.unwrap().unread, 0);

        let incremental = svc
            .user_poll(
                user_id,
                &MessageQuery {
                    after_id: Some(all[0].id),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(incremental.len(), 1);
        assert_eq!(incremental[0].sender_role, SenderRole::Admin);
    }

    #[tokio::test]
    async fn test_first_reply_claims_session() {
        let pool = setup_pool().await;
        let svc = ChatService::new(pool.clone());
        let user_id = seed_user(&pool, "alice").await;
        let admin_id = seed_user(&pool, "admin").await;

        let session = svc.open_session(user_id).await.unwrap();
        assert!(session.admin_id.is_none());

        svc.admin_reply(admin_id, session.id, message("您好"))
            .await
            .unwrap();
        let claimed_by: Option<i64> =
            sqlx::query_scalar("SELECT admin_id FROM chat_sessions WHERE id = ?")
                .bind(session.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(claimed_by, Some(admin_id));
    }

    #[tokio::test]
    async fn test_closed_session_rejects_reply_and_reopens_for_user() {
        let pool = setup_pool().await;
        let svc = ChatService::new(pool.clone());
        let user_id = seed_user(&pool, "alice").await;
        let admin_id = seed_user(&pool, "admin").await;

        let session = svc.open_session(user_id).await.unwrap();
        svc.close_session(session.id).await.unwrap();
        assert!(svc.close_session(session.id).await.is_err());
        assert!(svc
            .admin_reply(admin_id, session.id, message("您好"))
            .await
            .is_err());

        // 用户再发消息会开新会话
        let msg = svc.user_send(user_id, message("还在吗")).await.unwrap();
        assert_ne!(msg.session_id, session.id);
    }

    #[tokio::test]
    async fn test_message_content_validation() {
        let pool = setup_pool().await;
        let svc = ChatService::new(pool.clone());
        let user_id = seed_user(&pool, "alice").await;

        assert!(svc.user_send(user_id, message("   ")).await.is_err());
        let too_long = "啊".repeat(MAX_MESSAGE_LEN + 1);
        assert!(svc.user_send(user_id, message(&too_long)).await.is_err());
    }
}
