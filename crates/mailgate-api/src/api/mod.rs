/// HTTP handlers
pub mod admin;
pub mod breakglass;
pub mod emails;
pub mod health;
pub mod send;
