//! API Routes
//!
//! Route handlers organized by functionality.

pub mod camera;
pub mod health;
pub mod logs;
