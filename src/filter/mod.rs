pub mod editor;
pub mod eval;
pub mod model;
pub mod negate;
pub mod rewrite;
pub mod validate;
pub mod wire;
