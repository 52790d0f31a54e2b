pub mod mutation_worker;

pub use mutation_worker::{MutationWorker, WorkerHandle};
