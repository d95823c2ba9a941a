pub mod broadcast;
pub mod config;
pub mod listen;
pub mod send;
