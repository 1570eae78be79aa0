//! Redis-backed storage and pub/sub plumbing.

pub mod redis_repo;

pub use redis_repo::RedisRepository;
