pub mod stub;

pub use stub::{EngineProbe, StubEngine, DEFAULT_VIDEO_FRAMES};
