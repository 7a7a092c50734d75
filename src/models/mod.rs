pub mod actor;
pub mod assignment;
pub mod courier;
pub mod event;
pub mod order;
