/// Startup banner for the `chanbus` binary.
pub mod banner;
/// Script-facing bridge: type-erased queues and the Lua surface.
pub mod bridge;
/// Channel directory, bounded queues, Publisher/Subscriber handles.
pub mod broker;
/// Settings loading (file + environment).
pub mod config;
/// Broker-level error type unifying registry, channel and marshalling errors.
pub mod error;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Message registry: payload schemas and native bindings.
pub mod registry;
/// Worker lifecycle, cancellation and script runners.
pub mod runtime;
/// Named shared objects and synchronized values.
pub mod shared;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Lua bridge and type-erased queue access.
pub use bridge::{lua_to_json, DynQueue, LuaBridge};
/// Broker, handles and queue statistics.
pub use broker::{
    Broker, ChannelDirectory, ChannelInfo, ChannelStats, PushOutcome, Publisher, Queue, Subscriber,
};
/// Error codes and context helpers shared with `chanbus-error`.
pub use chanbus_error::{
    ChannelError, ChanbusResult, ErrorExt, MarshalError, RecvError, RegistryError, ResultExt,
    StackError, StatusCode, TryRecvError,
};
/// Settings.
pub use config::{BrokerConfig, Settings};
/// Operation errors and result types.
pub use error::{BrokerError, BrokerResult};
/// Logging setup.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Payload schemas.
pub use registry::{
    FieldAccess, FieldType, MessageRegistry, MethodDescriptor, Payload, PayloadType, Registration,
};
/// Lifecycle and scripts.
pub use runtime::{run_script, spawn_script, CancelToken, Lifecycle, ShutdownReport};
/// Shared named objects.
pub use shared::{NamedObjects, SyncValue};
