pub(crate) mod shared;
pub(crate) mod slim;
pub(crate) mod sync;
pub(crate) mod validate;
