pub mod applications;
pub mod lease;
