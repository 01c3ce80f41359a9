pub mod project_repo;
pub mod telegram_user_repo;

pub use project_repo::ProjectRepo;
pub use telegram_user_repo::TelegramUserRepo;
