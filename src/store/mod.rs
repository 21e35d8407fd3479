// Remote store access: the store trait, its HTTP implementation and the paging adapter.

pub mod adapter;
pub mod drive;
pub mod traits;
