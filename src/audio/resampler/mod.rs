pub mod base;
pub mod rubato;

pub use base::{BaseAudioResampler, ResamplerResult};
pub use self::rubato::RubatoAudioResampler;
