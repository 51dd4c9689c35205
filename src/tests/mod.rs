// Test modules

mod integration_test;
mod query_generation_test;
mod visualization_test;
