pub mod files;
pub mod receive;
pub mod send;
