pub mod internal;
pub mod shell;

use crate::core::workflow::executor::ExecutorRegistryBuilder;
use crate::core::workflow::executors::shell::CommandRunner;
use std::sync::Arc;

/// Register the built-in executors: shell and internal. Script and
/// remote-model-call kinds stay unregistered here; hosts that embed a
/// scripting runtime or model transport register their own.
pub fn register_builtins(builder: &mut ExecutorRegistryBuilder) {
    builder
        .register(shell::ShellExecutor::new())
        .register(internal::InternalExecutor::new());
}

/// Same as [`register_builtins`] but with an injected command runner, for
/// tests and embedders that intercept subprocess execution.
pub fn register_builtins_with_runner(
    builder: &mut ExecutorRegistryBuilder,
    runner: Arc<dyn CommandRunner>,
) {
    builder
        .register(shell::ShellExecutor::with_runner(runner))
        .register(internal::InternalExecutor::new());
}
