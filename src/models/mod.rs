//! Data models for the library server

pub mod book;
pub mod person;
pub mod principal;

// Re-export commonly used types
pub use book::{Book, BookContent, BookStatus};
pub use person::Person;
pub use principal::{Principal, Role, Subject};
