pub mod anilist;
pub mod app;
pub mod models;
pub mod notion;
pub mod notion_fallback;
pub mod slug;
pub mod tmdb;
pub mod utils;
