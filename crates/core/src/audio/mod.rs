pub mod analysis;
pub mod clip;
pub mod effects;
pub mod io;

pub use clip::AudioClip;
