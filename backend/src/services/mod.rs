pub mod audit;
pub mod rate_limiter;
