pub mod elevenlabs;
pub mod local_tts;
pub mod openai;
