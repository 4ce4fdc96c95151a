pub(crate) mod effect;
pub(crate) mod hash;
pub(crate) mod node;
pub(crate) mod timeline;
