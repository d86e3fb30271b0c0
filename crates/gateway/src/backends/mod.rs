//! Backend adapters for the coordination store port.

pub mod dynamodb;
pub mod mongodb;
