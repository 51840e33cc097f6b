pub mod api;
pub mod kv_config;
pub mod router;
