pub mod memory;
pub mod surreal;
pub mod timeout;
