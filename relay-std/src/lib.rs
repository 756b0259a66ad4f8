//! Built-in `ArgumentResolver`/`ReturnValueHandler` implementations, value
//! types, and hooks for Relay.
//!
//! Every concrete type named by the framework's §4.3/§4.4 tables lives
//! here: the core crate only defines the contracts, this crate fulfills
//! them the way a user would expect out of the box.

pub mod body;
pub mod hooks;
pub mod resolvers;
pub mod returns;
pub mod value;

pub use body::{Form, Json};
pub use hooks::event::EventDispatchHook;
pub use hooks::logging::LoggingInterceptor;
pub use resolvers::consumer::{ConsumerEventName, ConsumerPayload};
pub use resolvers::http::{HeaderResolver, Pagination, PathBoolean, PathInt, PathString, QueryValues, StdContext};
pub use resolvers::ws::{WsConnId, WsPayload};
pub use resolvers::{register_consumer_builtins, register_http_builtins, register_websocket_builtins};
pub use returns::{
    register_builtins as register_return_value_builtins, Binary, BinaryOptions, Cookie, JsonReturnHandler, Redirect,
    StringReturnHandler,
};
pub use value::multipart::{UploadedFile, UploadedFiles};
