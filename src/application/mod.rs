//! Application services: the node storage engine and its collaborators.

pub mod error;
pub mod render;
pub mod repos;
pub mod storage;
