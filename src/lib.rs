pub mod animation;
pub mod bubble;
pub mod capture;
pub mod config;
pub mod dismiss_target;
pub mod error;
pub mod geometry;
pub mod gesture;
pub mod headless;
pub mod overlay;
pub mod paths;
pub mod pipeline;
pub mod recognition;
pub mod replies;
pub mod reply_card;
pub mod scanning;
pub mod scene;
pub mod service;
pub mod skins;
