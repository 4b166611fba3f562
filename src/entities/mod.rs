pub mod email_verification;
pub mod setting;
pub mod user_identity;
