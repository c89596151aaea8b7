pub mod codec;
pub mod constants;
pub mod session;
pub mod types;
