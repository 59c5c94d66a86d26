pub mod like_repository;
pub mod option_repository;
pub mod poll_repository;
pub mod vote_repository;

pub use like_repository::*;
pub use option_repository::*;
pub use poll_repository::*;
pub use vote_repository::*;
