pub mod ingestor;
pub mod notifier;
pub mod slot_finder;
pub mod state_machine;
pub mod store;
pub mod supervisor;
