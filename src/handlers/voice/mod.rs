mod handler;

pub use handler::{handle_interruption, voice_websocket};
