// Format internals: name packing, string pool, schema, row decoding, and the facade.
pub mod column;
pub mod container;
pub mod database;
pub mod error;
pub mod options;
pub mod row;
pub mod schema;
pub mod stream_name;
pub mod string_pool;
