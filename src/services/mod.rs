pub mod api_client;
pub mod geometry;
pub mod inference;
pub mod job_store;
pub mod lifecycle;
pub mod normalizer;
pub mod page_source;
pub mod poller;
pub mod storage;
pub mod views;
