pub mod assignment;
pub mod availability;
pub mod lifecycle;
pub mod ratings;
pub mod recommend;
pub mod scoring;
pub mod stats;
pub mod watcher;
