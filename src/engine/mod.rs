pub mod external;
pub mod operators;
pub mod relaxer;
