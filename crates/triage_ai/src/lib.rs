pub mod analyze;
pub mod llm;
pub mod reconcile;
