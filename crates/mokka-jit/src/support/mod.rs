//! Support libraries for the compilation pipeline: bitsets for dataflow,
//! byte buffers for emission, executable memory, and the address-keyed
//! radix tree backing instruction-pointer lookups.

pub mod bitset;
pub mod buffer;
pub mod exec;
pub mod radix;

pub use bitset::Bitset;
pub use buffer::Buffer;
pub use exec::{ExecError, ExecRegion};
pub use radix::RadixTree;
