pub mod app;
pub mod cache;
pub mod camera3d;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod layout;
pub mod media;
pub mod readiness;
pub mod renderer;
pub mod scene;
pub mod session;
pub mod time;

pub use app::{run, run_with_overrides, App};
pub use error::LoadError;
pub use session::GlobeSession;

pub(crate) fn wrap_angle(mut radians: f32) -> f32 {
    let two_pi = 2.0 * std::f32::consts::PI;
    while radians > std::f32::consts::PI {
        radians -= two_pi;
    }
    while radians < -std::f32::consts::PI {
        radians += two_pi;
    }
    radians
}
