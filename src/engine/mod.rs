// Engine: cached fetches, catalog listings, reconciliation and promotion.

pub mod cache;
pub mod catalog;
pub mod fetcher;
pub mod locks;
pub mod promote;
pub mod reconcile;
pub mod session;
pub mod stats;
