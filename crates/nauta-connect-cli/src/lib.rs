//! NautaConnect CLI: the command-line front end around the portal engine.

pub mod config;
pub mod credentials;
pub mod handler;
pub mod render;
