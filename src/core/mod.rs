pub mod errors;
pub mod gate;
pub mod invites;
pub mod models;
pub mod services;
pub mod webhook;
