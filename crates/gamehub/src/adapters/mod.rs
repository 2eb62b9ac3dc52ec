//! Brand adapters: each owns one wire dialect's connect sequence and frame
//! loop, and shares the login pipeline in [`crate::handler`].

pub(crate) mod inout;
pub(crate) mod jili;
pub(crate) mod sfs;
