mod handle;
mod objects;
mod value;

pub use handle::{Address, Reference};
pub use objects::{ElementKindMismatch, HeapObject};
pub use value::{F16_MAX, Value, f16_bits_to_f32, f32_to_f16_bits, f64_to_f16_bits};
