pub mod api;
pub mod config;
pub mod discovery;
pub mod probe;
pub mod rtsp;
pub mod sources;

#[cfg(test)]
mod testing;
