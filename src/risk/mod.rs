//! Risk Controller (C7) plus the route cooldown it builds on.

pub mod controller;
pub mod cooldown;

pub use controller::RiskController;
pub use cooldown::RouteCooldown;
