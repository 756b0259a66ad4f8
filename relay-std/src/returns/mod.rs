//! Built-in `ReturnValueHandler`s (§4.4).

mod binary;
mod json;
mod redirect;
mod string;

pub use binary::{Binary, BinaryOptions, Cookie};
pub use json::JsonReturnHandler;
pub use redirect::Redirect;
pub use string::StringReturnHandler;

pub(crate) use binary::BinaryReturnHandler;
pub(crate) use redirect::RedirectReturnHandler;

use relay_core::outcome::ReturnHandlerRegistry;

/// Register every built-in return-value handler, in the order the original
/// `internal/bootstrap/bootstrap.go` wires them: string, JSON, binary,
/// redirect. Registration order is priority order, so a handler here never
/// shadows one an application registers afterward for a more specific type.
pub fn register_builtins(registry: &mut ReturnHandlerRegistry) {
    registry.register(StringReturnHandler);
    registry.register(JsonReturnHandler);
    registry.register(BinaryReturnHandler);
    registry.register(RedirectReturnHandler);
}
