mod voice;

pub use voice::create_voice_router;
