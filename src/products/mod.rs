//! Product Catalog Module
//! Mission: Storefront catalog with soft-delete and cached public reads

pub mod api;
pub mod models;
pub mod store;

pub use api::ProductsState;
pub use store::ProductStore;
