pub mod storage;
pub mod viewer;
