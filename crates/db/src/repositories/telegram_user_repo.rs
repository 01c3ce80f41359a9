//! Repository for the `telegram_user` table.

use sqlx::PgPool;

use modelforge_core::types::DbId;

pub struct TelegramUserRepo;

impl TelegramUserRepo {
    /// Chat id registered for a `telegram_user` row, if the row exists.
    pub async fn find_chat_id(pool: &PgPool, id: DbId) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT user_id FROM telegram_user WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
