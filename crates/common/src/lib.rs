// corkboard-common: shared types and the wire protocol for the Corkboard workspace

pub mod protocol;
pub mod types;
