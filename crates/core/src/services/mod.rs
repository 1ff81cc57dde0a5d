pub mod anonymous_service;
pub mod identity_service;
pub mod save_queue_service;
pub mod token_service;
