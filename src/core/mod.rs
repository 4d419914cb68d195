// Core modules implementing records, storage, table semantics, and error modeling.
pub mod error;
pub mod record;
pub mod registry;
pub mod store;
pub mod table;
