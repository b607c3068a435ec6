pub mod fetch_url;
pub mod initialize;
pub mod ping;
pub mod tool;
