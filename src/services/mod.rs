pub mod cleanup;
pub mod converter;
pub mod downloader;
pub mod extractor;
pub mod orchestrator;
pub mod sessions;
pub mod storage;
pub mod tool;
pub mod worker;
pub mod workspace;
