pub mod entity;
pub mod error;
pub mod project;
pub mod session;
pub mod stream;
