pub mod actions;
pub mod introspect;
