pub(crate) mod bitmap;
pub(crate) mod image;
pub(crate) mod ops;
pub(crate) mod store;
