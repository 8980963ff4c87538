// bfc optimizer
// AST-to-AST rewrite passes that run between the parser and the backend.

pub mod run_length;

pub use run_length::RunLengthMerger;
