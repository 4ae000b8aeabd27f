use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::{LoggingConfig, Rotation},
    formatter,
};

/// Файловый слой с ротацией. Guard нужно держать до конца работы,
/// иначе хвост буфера не попадёт в файл.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let dir = &config.log_dir;
    let name = &config.file.filename;
    let appender = match config.file.rotation {
        Rotation::Hourly => rolling::hourly(dir, name),
        Rotation::Daily => rolling::daily(dir, name),
        Rotation::Never => rolling::never(dir, name),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = formatter::build_formatter_from_config(config, config.file.format, false, writer);
    (layer, guard)
}
