pub mod cache;
pub mod codec;
pub mod definition;
pub mod resolver;
pub mod value;

pub use cache::AbiCache;
pub use definition::{AbiDefinition, AbiKind, AbiParam, Artifact, ContractAbi};
pub use resolver::{resolve, CallArgs, Resolved};
pub use value::{AbiValue, CallOutput, DecodedTuple};
