pub mod audit;
pub mod pipeline;
pub mod regions;
pub mod reuse;
