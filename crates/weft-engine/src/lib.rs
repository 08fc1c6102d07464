//! Weft Proxy Engine
//!
//! Generates proxy types over the `weft-types` model at runtime and routes
//! every call on a proxy through a chain of interceptors:
//! - **Shapes** (`shape`): proxy kinds, generation options, hooks and selectors
//! - **Cache** (`cache`): at-most-once synthesis per shape
//! - **Synthesis** (`synth`): member collection, forwarding and thunks
//! - **Invocation** (`invocation`): the interceptor chain and `proceed`
//! - **Rebinding** (`rebind`): contract method → target implementation
//! - **Replication** (`replicate`): attributes copied onto generated members
//! - **Instances** (`instance`): proxy state, target accessor and utilities
//! - **Generator** (`generator`, `scope`): entry points and owned caches
//!
//! ```rust,ignore
//! let generator = ProxyGenerator::new();
//! let logging = interceptor_fn(|inv| {
//!     tracing::info!(method = %inv.method(), "calling");
//!     inv.proceed()
//! });
//! let proxy = generator.create_interface_proxy_with_target(&greeter, english, vec![logging])?;
//! proxy.call("Greet", vec![Value::from("Ada")])?;
//! ```

#![warn(rust_2018_idioms)]

pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod instance;
pub mod invocation;
pub mod rebind;
pub mod replicate;
pub mod scope;
pub mod shape;
pub mod synth;

use std::sync::Once;

pub use cache::TypeCache;
pub use config::GeneratorConfig;
pub use error::{GenerationError, GenerationResult, ProxyError, ProxyResult};
pub use generator::{ProxyGenerator, ProxyRequest};
pub use instance::{
    is_proxy, proxy_state, unproxied_instance, unproxied_instance_deep, unproxied_type,
    ProxyAccessor, ProxyState,
};
pub use invocation::{interceptor_fn, FnInterceptor, Interceptor, Invocation};
pub use rebind::MethodResolver;
pub use replicate::{AttributeReplicator, CustomAttributeInfo, MemberSite};
pub use scope::ModuleScope;
pub use shape::{
    AllMethodsHook, InterceptorSelector, ProxyGenerationHook, ProxyGenerationOptions, ProxyKind,
    ProxyShape,
};
pub use synth::{Forward, GeneratedConstructor, GeneratedProxyType, ProxyMethod};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for proxy generation and dispatch.
///
/// Call once at startup. Does nothing unless `RUST_LOG` is set, e.g.
/// `RUST_LOG=weft_engine=debug` for cache and synthesis events or
/// `RUST_LOG=weft_engine::invocation=trace` for every `proceed` step.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
