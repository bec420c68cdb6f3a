//! Application services: publishing, feed reads, likes, and search.

pub mod clock;
pub mod error;
pub mod fanout;
pub mod feed;
pub mod likes;
pub mod posts;
pub mod repos;
pub mod search;
