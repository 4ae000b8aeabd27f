use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chanbus_error::{context, ensure, ChanbusResult, LogLevel, ResultExt, StackError, StatusCode};
use mlua::Lua;
use tracing::{debug, error, info, trace, warn};

use super::Lifecycle;
use crate::{bridge::LuaBridge, error::BrokerError};

/// Выполняет Lua-скрипт в новом состоянии с установленным API брокера.
///
/// Блокирует поток до завершения скрипта.
pub fn run_script(
    bridge: &LuaBridge,
    path: &Path,
) -> ChanbusResult<()> {
    let source = context!(fs::read_to_string(path), "reading script {}", path.display())?;
    let lua = Lua::new();
    bridge
        .install(&lua)
        .map_err(BrokerError::from)
        .context("installing chanbus API")?;
    lua.load(source.as_str())
        .set_name(format!("@{}", path.display()))
        .exec()
        .map_err(BrokerError::from)
        .with_context(|| format!("running script {}", path.display()))
}

/// Запускает скрипт в отдельном потоке, принадлежащем `lifecycle`.
///
/// Отсутствующий файл отклоняется сразу, до запуска потока.
pub fn spawn_script(
    lifecycle: &Lifecycle,
    path: PathBuf,
    poll: Duration,
) -> ChanbusResult<()> {
    ensure!(
        path.is_file(),
        StatusCode::Io,
        "script not found: {}",
        path.display()
    );
    let name = format!(
        "script:{}",
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "anonymous".to_string())
    );
    let broker = lifecycle.broker().clone();
    lifecycle.spawn(&name, move |token| {
        let bridge = LuaBridge::new(broker, token).with_poll_interval(poll);
        match run_script(&bridge, &path) {
            Ok(()) => info!(script = %path.display(), "script finished"),
            Err(e) => report_failure(&path, &e),
        }
    })?;
    Ok(())
}

fn report_failure(
    path: &Path,
    e: &StackError,
) {
    let script = path.display();
    let code = e.status_code();
    match e.log_level() {
        LogLevel::Trace => trace!(%script, %code, error = %e, "script failed"),
        LogLevel::Debug => debug!(%script, %code, error = %e, "script failed"),
        LogLevel::Info => info!(%script, %code, error = %e, "script failed"),
        LogLevel::Warn => warn!(%script, %code, error = %e, "script failed"),
        LogLevel::Error => error!(%script, %code, error = %e, "script failed"),
    }
}
