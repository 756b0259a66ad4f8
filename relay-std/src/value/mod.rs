//! Value types carried by built-in resolvers and return handlers.

pub mod multipart;
