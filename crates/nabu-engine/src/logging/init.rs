use std::sync::Once;

use log::LevelFilter;

/// Modules below the backend that log per-call detail at `info`.
const GPU_INTERNALS: [&str; 3] = ["wgpu_core", "wgpu_hal", "naga"];

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "nabu_engine=debug,wgpu_core=warn") and replaces every other level
/// setting when present. `RUST_LOG` is consulted when it is `None`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    /// Level for the backend and everything else.
    pub level: LevelFilter,
    /// Level for wgpu and naga internals.
    pub gpu_level: LevelFilter,
    /// Millisecond timestamps; frame timing issues are hard to read without them.
    pub timestamps: bool,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            level: LevelFilter::Info,
            gpu_level: LevelFilter::Warn,
            timestamps: true,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    /// The filter string the logger ends up with.
    pub fn filter_directives(&self) -> String {
        if let Some(filter) = &self.env_filter {
            return filter.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            return filter;
        }

        let level = self.level.as_str().to_ascii_lowercase();
        let gpu = self.gpu_level.as_str().to_ascii_lowercase();
        let mut directives = level;
        for module in GPU_INTERNALS {
            directives.push_str(&format!(",{module}={gpu}"));
        }
        directives
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// Later calls are ignored. A host that installed its own logger keeps it;
/// the backend itself only logs through the `log` facade.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder
            .parse_filters(&config.filter_directives())
            .write_style(config.write_style);

        if config.timestamps {
            builder.format_timestamp_millis();
        } else {
            builder.format_timestamp(None);
        }

        if builder.try_init().is_err() {
            log::debug!("logger already installed by host; keeping it");
            return;
        }

        log::debug!("logging initialized");
    });
}
