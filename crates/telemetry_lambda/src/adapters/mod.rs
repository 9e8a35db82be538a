pub mod object_store;
pub mod queue;
pub mod stream;
