//! Command handlers for kubed

mod login;

pub use login::*;
