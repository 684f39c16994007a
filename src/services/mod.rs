pub mod access;
pub mod instruction;
pub mod moderation;
pub mod provider;
pub mod scheduler;
pub mod thread_session;
