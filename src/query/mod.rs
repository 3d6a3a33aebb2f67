//! Query templates for tablegate
//!
//! Operators author queries as templates with brace tokens. At startup each
//! definition is compiled once into positional SQL; per request the binder
//! turns query parameters into the ordered parameter list.

mod binder;
mod compiler;
mod definition;
mod errors;

pub use binder::bind;
pub use compiler::{compile, compile_template, positional_placeholder, CompiledQuery, TemplateContext};
pub use definition::{
    Preprocessor, QueryDefinition, QuerySpec, Serializer, SerializerKind, Validator,
};
pub use errors::{BindError, BindResult, TemplateError, TemplateResult};
