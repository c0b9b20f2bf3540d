pub mod api_keys;
pub mod key_store;
pub mod key_validator;
pub mod presign;
pub mod range;
pub mod staging;
pub mod storage;
pub mod streaming;
pub mod upload_coordinator;
pub mod worker;
