pub mod identity;
pub mod pending_save;
pub mod settings;
