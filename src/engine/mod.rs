pub mod feed;
pub mod normalizer;
pub mod reconciler;
pub mod retention;
pub mod store;
pub mod tracker;
